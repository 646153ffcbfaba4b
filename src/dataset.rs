//! Agency dataset loading.
//!
//! One bet per line: `first_name,last_name,document,YYYY-MM-DD,number`.
//! Malformed lines are skipped with a warning so one bad row does not
//! block the rest of the agency's submissions.

use std::path::Path;

use chrono::NaiveDate;

use crate::bet::{Bet, MAX_NAME_LEN};
use crate::error::{LotteryError, Result};

/// Read and parse the dataset at `path`, tagging every bet with `agency`.
pub async fn load_bets(path: impl AsRef<Path>, agency: u8) -> Result<Vec<Bet>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        LotteryError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read dataset {}: {}", path.display(), e),
        ))
    })?;

    let bets = parse_bets(&content, agency);
    tracing::info!(
        path = %path.display(),
        agency,
        count = bets.len(),
        "dataset loaded"
    );
    Ok(bets)
}

/// Parse dataset text. Blank lines are ignored.
pub fn parse_bets(content: &str, agency: u8) -> Vec<Bet> {
    let mut bets = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line, agency) {
            Ok(bet) => bets.push(bet),
            Err(reason) => {
                tracing::warn!(line = line_num + 1, reason = %reason, "skipping dataset line");
            }
        }
    }

    bets
}

fn parse_line(line: &str, agency: u8) -> std::result::Result<Bet, String> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() != 5 {
        return Err(format!("expected 5 fields, got {}", parts.len()));
    }

    let first_name = parts[0];
    let last_name = parts[1];
    if first_name.len() > MAX_NAME_LEN || last_name.len() > MAX_NAME_LEN {
        return Err("name longer than 255 bytes".to_string());
    }
    let document: u32 = parts[2]
        .parse()
        .map_err(|_| format!("invalid document {:?}", parts[2]))?;
    let birthdate = NaiveDate::parse_from_str(parts[3], "%Y-%m-%d")
        .map_err(|_| format!("invalid birthdate {:?}", parts[3]))?;
    let number: u32 = parts[4]
        .parse()
        .map_err(|_| format!("invalid number {:?}", parts[4]))?;

    Ok(Bet::new(
        agency, first_name, last_name, document, birthdate, number,
    ))
}
