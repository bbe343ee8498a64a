//! Author, committer and tagger identities
//!
//! Encoded as `<name> <<email>> <seconds> <+|-HHMM>`. The timestamp is kept as a
//! `DateTime<FixedOffset>`, so the offset sign is derived rather than stored on its own.

use crate::errors::{Error, Result};
use chrono::{DateTime, FixedOffset, Offset};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Signature {
    name: String,
    email: String,
    timestamp: DateTime<FixedOffset>,
}

impl Signature {
    /// Create a signature stamped with the current local time
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        Self::new_with_timestamp(name, email, chrono::Local::now().fixed_offset())
    }

    pub fn new_with_timestamp(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<Self> {
        let name = name.into();
        let email = email.into();

        for (field, value) in [("name", &name), ("email", &email)] {
            if value.contains(['<', '>', '\n', '\0']) {
                return Err(Error::InvalidArgument(format!(
                    "signature {field} '{}' contains reserved characters",
                    value.escape_debug()
                )));
            }
        }

        Ok(Signature {
            name,
            email,
            timestamp,
        })
    }

    /// Create a signature from seconds since the epoch and an offset in minutes
    pub fn new_with_time(
        name: impl Into<String>,
        email: impl Into<String>,
        seconds: i64,
        offset_minutes: i32,
    ) -> Result<Self> {
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            Error::InvalidArgument(format!("invalid UTC offset of {offset_minutes} minutes"))
        })?;
        let timestamp = DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid timestamp {seconds}")))?
            .with_timezone(&offset);

        Self::new_with_timestamp(name, email, timestamp)
    }

    /// Load the author identity from `GIT_AUTHOR_NAME`, `GIT_AUTHOR_EMAIL` and `GIT_AUTHOR_DATE`
    ///
    /// The date is optional and accepted as RFC 2822 or `%Y-%m-%d %H:%M:%S %z`.
    pub fn load_from_env() -> Result<Self> {
        let name = std::env::var("GIT_AUTHOR_NAME")
            .map_err(|_| Error::NotFound("GIT_AUTHOR_NAME".to_string()))?;
        let email = std::env::var("GIT_AUTHOR_EMAIL")
            .map_err(|_| Error::NotFound("GIT_AUTHOR_EMAIL".to_string()))?;
        let timestamp = std::env::var("GIT_AUTHOR_DATE").ok().and_then(|date_str| {
            DateTime::parse_from_rfc2822(&date_str)
                .or_else(|_| DateTime::parse_from_str(&date_str, "%Y-%m-%d %H:%M:%S %z"))
                .ok()
        });

        match timestamp {
            Some(timestamp) => Signature::new_with_timestamp(name, email, timestamp),
            None => Signature::new(name, email),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }

    pub fn offset_minutes(&self) -> i32 {
        self.timestamp.offset().fix().local_minus_utc() / 60
    }

    /// "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Encoded form as it appears in commit and tag headers
    pub fn display(&self) -> String {
        let offset = self.offset_minutes();
        let sign = if offset < 0 { '-' } else { '+' };
        let offset = offset.unsigned_abs();

        format!(
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.seconds(),
            sign,
            offset / 60,
            offset % 60
        )
    }
}

fn parse_offset(value: &str) -> Result<i32> {
    let invalid = || Error::malformed(format!("invalid timezone offset '{value}'"));

    let (sign, digits) = match value.split_at_checked(1) {
        Some(("+", digits)) => (1, digits),
        Some(("-", digits)) => (-1, digits),
        _ => return Err(invalid()),
    };
    if digits.len() != 4 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours = digits[..2].parse::<i32>().map_err(|_| invalid())?;
    let minutes = digits[2..].parse::<i32>().map_err(|_| invalid())?;
    let total = hours * 60 + minutes;

    // "-0000" has no canonical re-encoding
    if minutes >= 60 || (sign < 0 && total == 0) {
        return Err(invalid());
    }

    Ok(sign * total)
}

impl TryFrom<&str> for Signature {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        // Format: "name <email> timestamp timezone"
        let email_start = value
            .find('<')
            .ok_or_else(|| Error::malformed("invalid signature: missing '<'"))?;
        let email_end = value
            .find('>')
            .filter(|end| *end > email_start)
            .ok_or_else(|| Error::malformed("invalid signature: missing '>'"))?;

        let name = value[..email_start]
            .strip_suffix(' ')
            .ok_or_else(|| Error::malformed("invalid signature: missing space before '<'"))?;
        let email = &value[email_start + 1..email_end];

        let time = value[email_end + 1..]
            .strip_prefix(' ')
            .ok_or_else(|| Error::malformed("invalid signature: missing timestamp"))?;
        let (seconds, offset) = time
            .split_once(' ')
            .ok_or_else(|| Error::malformed("invalid signature: missing timezone"))?;

        if seconds.is_empty()
            || !seconds.bytes().all(|byte| byte.is_ascii_digit())
            || (seconds.len() > 1 && seconds.starts_with('0'))
        {
            return Err(Error::malformed(format!("invalid timestamp '{seconds}'")));
        }
        let seconds = seconds
            .parse::<i64>()
            .map_err(|_| Error::malformed(format!("invalid timestamp '{seconds}'")))?;
        let offset = parse_offset(offset)?;

        Signature::new_with_time(name, email, seconds, offset)
            .map_err(|err| Error::malformed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("A U Thor <author@example.com> 1700000000 +0000", 0)]
    #[case("A U Thor <author@example.com> 1700000000 +0530", 330)]
    #[case("A U Thor <author@example.com> 1700000000 -0700", -420)]
    #[case(" <nobody@example.com> 0 +0100", 60)]
    fn signatures_reencode_identically(#[case] encoded: &str, #[case] offset: i32) {
        let signature = Signature::try_from(encoded).unwrap();

        assert_eq!(signature.offset_minutes(), offset);
        assert_eq!(signature.display(), encoded);
    }

    #[rstest]
    #[case("A U Thor author@example.com> 1 +0000")]
    #[case("A U Thor <author@example.com>")]
    #[case("A U Thor <author@example.com> 1")]
    #[case("A U Thor <author@example.com> x +0000")]
    #[case("A U Thor <author@example.com> 1 +000")]
    #[case("A U Thor <author@example.com> 1 +0075")]
    #[case("A U Thor <author@example.com> 1 -0000")]
    #[case("A U Thor<author@example.com> 1 +0000")]
    fn malformed_signatures_are_rejected(#[case] encoded: &str) {
        assert!(matches!(
            Signature::try_from(encoded),
            Err(Error::Malformed(_))
        ));
    }

    #[rstest]
    fn reserved_characters_are_rejected() {
        assert!(Signature::new_with_time("a <b>", "c", 0, 0).is_err());
        assert!(Signature::new_with_time("a", "c\n", 0, 0).is_err());
    }
}
