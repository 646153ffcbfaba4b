//! Bet record body encoding and decoding.
//!
//! ```text
//! ┌────────┬───────┬────────┬──────┬──────────┬─────┬───────┬──────┬────────┬────────┐
//! │ fn len │ first │ ln len │ last │ document │ day │ month │ year │ number │ agency │
//! │ u8     │ bytes │ u8     │bytes │ u32 BE   │ u8  │ u8    │u16 BE│ u32 BE │ u8     │
//! └────────┴───────┴────────┴──────┴──────────┴─────┴───────┴──────┴────────┴────────┘
//! ```

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDate};

use crate::bet::{Bet, MAX_NAME_LEN};
use crate::error::{LotteryError, Result};

/// Size of the fixed-width fields of a record body (everything but the names).
pub const RECORD_FIXED_SIZE: usize = 1 + 1 + 4 + 1 + 1 + 2 + 4 + 1;

/// Encoded size of a record body.
#[inline]
pub fn encoded_len(bet: &Bet) -> usize {
    RECORD_FIXED_SIZE + bet.first_name.len() + bet.last_name.len()
}

/// Append the record body of `bet` to `buf`.
///
/// Fails if a name does not fit its 1-byte length or the birth year does not
/// fit in 16 bits; `buf` is left untouched in that case.
pub fn encode_bet_into(bet: &Bet, buf: &mut BytesMut) -> Result<()> {
    check_name("first name", &bet.first_name)?;
    check_name("last name", &bet.last_name)?;
    let year = u16::try_from(bet.birthdate.year()).map_err(|_| {
        LotteryError::Protocol(format!(
            "Birth year {} does not fit the wire format",
            bet.birthdate.year()
        ))
    })?;

    buf.reserve(encoded_len(bet));
    buf.put_u8(bet.first_name.len() as u8);
    buf.put_slice(bet.first_name.as_bytes());
    buf.put_u8(bet.last_name.len() as u8);
    buf.put_slice(bet.last_name.as_bytes());
    buf.put_u32(bet.document);
    buf.put_u8(bet.birthdate.day() as u8);
    buf.put_u8(bet.birthdate.month() as u8);
    buf.put_u16(year);
    buf.put_u32(bet.number);
    buf.put_u8(bet.agency);
    Ok(())
}

/// Encode the record body of `bet`.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use lottery_intake::protocol::{decode_bet, encode_bet, encoded_len};
/// use lottery_intake::Bet;
///
/// let birthdate = NaiveDate::from_ymd_opt(1999, 3, 17).unwrap();
/// let bet = Bet::new(1, "Santiago Lionel", "Lorca", 30904465, birthdate, 7574);
///
/// let body = encode_bet(&bet).unwrap();
/// assert_eq!(body.len(), encoded_len(&bet));
/// assert_eq!(decode_bet(&body), Some(bet));
/// assert_eq!(decode_bet(&body[..3]), None);
/// ```
pub fn encode_bet(bet: &Bet) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(encoded_len(bet));
    encode_bet_into(bet, &mut buf)?;
    Ok(buf)
}

fn check_name(field: &str, value: &str) -> Result<()> {
    if value.len() > MAX_NAME_LEN {
        return Err(LotteryError::Protocol(format!(
            "{} is {} bytes, maximum is {}",
            field,
            value.len(),
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Decode a record body.
///
/// Returns `None` if the buffer is shorter than any declared field, a name is
/// not UTF-8 or the birthdate is not a calendar date. Trailing bytes after the
/// agency byte are ignored.
pub fn decode_bet(data: &[u8]) -> Option<Bet> {
    let mut cursor = Cursor::new(data);

    let first_len = cursor.u8()? as usize;
    let first_name = std::str::from_utf8(cursor.take(first_len)?).ok()?.to_owned();
    let last_len = cursor.u8()? as usize;
    let last_name = std::str::from_utf8(cursor.take(last_len)?).ok()?.to_owned();
    let document = cursor.u32()?;
    let day = cursor.u8()?;
    let month = cursor.u8()?;
    let year = cursor.u16()?;
    let number = cursor.u32()?;
    let agency = cursor.u8()?;

    let birthdate = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))?;

    Some(Bet {
        agency,
        first_name,
        last_name,
        document,
        birthdate,
        number,
    })
}

/// Bounds-checked reader over a byte slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
