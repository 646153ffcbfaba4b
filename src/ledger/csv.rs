//! CSV file ledger.
//!
//! One row per bet:
//! ```text
//! agency,first_name,last_name,document,birthdate,number
//! 1,Santiago Lionel,Lorca,30904465,1999-03-17,7574
//! ```
//!
//! Fields containing a comma, a quote or a line break are wrapped in quotes
//! with inner quotes doubled.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{BetLedger, BoxFuture};
use crate::bet::Bet;
use crate::error::{LotteryError, Result};

const FIELDS_PER_ROW: usize = 6;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ledger persisted as an append-only CSV file.
pub struct CsvLedger {
    path: PathBuf,
    /// Single writer lock; held for the whole write of one batch.
    file: Mutex<File>,
}

impl CsvLedger {
    /// Open (or create) the ledger file at `path` in append mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::debug!(path = %path.display(), "ledger opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Location of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append_rows(&self, bets: &[Bet]) -> Result<()> {
        if bets.is_empty() {
            return Ok(());
        }

        let mut rows = String::with_capacity(bets.len() * 64);
        for bet in bets {
            write_row(&mut rows, bet);
        }

        let mut file = self.file.lock().await;
        file.write_all(rows.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_rows(&self) -> Result<Vec<Bet>> {
        // Holding the writer lock keeps a stray append from being read half-written.
        let _guard = self.file.lock().await;
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_rows(&content)
    }
}

impl BetLedger for CsvLedger {
    fn append<'a>(&'a self, bets: &'a [Bet]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.append_rows(bets))
    }

    fn scan_all(&self) -> BoxFuture<'_, Result<Vec<Bet>>> {
        Box::pin(self.read_rows())
    }
}

fn write_row(out: &mut String, bet: &Bet) {
    out.push_str(&bet.agency.to_string());
    out.push(',');
    write_field(out, &bet.first_name);
    out.push(',');
    write_field(out, &bet.last_name);
    out.push(',');
    out.push_str(&bet.document.to_string());
    out.push(',');
    out.push_str(&bet.birthdate.format(DATE_FORMAT).to_string());
    out.push(',');
    out.push_str(&bet.number.to_string());
    out.push('\n');
}

fn write_field(out: &mut String, value: &str) {
    if value.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

/// Split CSV text into records of raw fields.
fn split_records(content: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(LotteryError::Ledger("unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

fn parse_rows(content: &str) -> Result<Vec<Bet>> {
    split_records(content)?
        .into_iter()
        .enumerate()
        .map(|(line, fields)| parse_bet(&fields).map_err(|e| at_row(e, line + 1)))
        .collect()
}

fn at_row(error: LotteryError, row: usize) -> LotteryError {
    match error {
        LotteryError::Ledger(msg) => LotteryError::Ledger(format!("row {}: {}", row, msg)),
        other => other,
    }
}

fn parse_bet(fields: &[String]) -> Result<Bet> {
    if fields.len() != FIELDS_PER_ROW {
        return Err(LotteryError::Ledger(format!(
            "expected {} fields, found {}",
            FIELDS_PER_ROW,
            fields.len()
        )));
    }

    Ok(Bet {
        agency: parse_number(&fields[0], "agency")?,
        first_name: fields[1].clone(),
        last_name: fields[2].clone(),
        document: parse_number(&fields[3], "document")?,
        birthdate: NaiveDate::parse_from_str(&fields[4], DATE_FORMAT).map_err(|e| {
            LotteryError::Ledger(format!("invalid birthdate {:?}: {}", fields[4], e))
        })?,
        number: parse_number(&fields[5], "number")?,
    })
}

fn parse_number<T: std::str::FromStr>(value: &str, field: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| LotteryError::Ledger(format!("invalid {} {:?}", field, value)))
}
