use chrono::NaiveDate;

/// Upper bound for invoice amounts; keeps values representable in the store.
pub const MAX_INVOICE_AMOUNT: u64 = 1_000_000_000_000;

/// Input rejected before any write happens.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("'{value}' is not a valid email address")]
    InvalidEmail { value: String },
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("amount exceeds the maximum of {max}")]
    AmountTooLarge { max: u64 },
    #[error("{field} is required for third-party billing")]
    MissingThirdPartyField { field: &'static str },
    #[error("score {value} is outside the 0-100 range")]
    ScoreOutOfRange { value: f64 },
    #[error("'{value}' is not a valid date (expected YYYY-MM-DD)")]
    InvalidDate { value: String },
}

/// Trimmed, non-empty text or a `Missing` error.
pub(crate) fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(trimmed.to_string())
}

/// Blank optional fields are treated as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Normalizes to lower case so the uniqueness check is case-insensitive.
pub(crate) fn email(value: &str) -> Result<String, ValidationError> {
    let candidate = required("email", value)?.to_ascii_lowercase();
    let invalid = || ValidationError::InvalidEmail {
        value: value.trim().to_string(),
    };

    let (local, domain) = candidate.split_once('@').ok_or_else(invalid)?;
    let domain_ok = domain
        .split_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'));
    let malformed = local.is_empty()
        || domain.contains('@')
        || !domain_ok
        || candidate.contains(char::is_whitespace);
    if malformed {
        return Err(invalid());
    }

    Ok(candidate)
}

pub(crate) fn date(value: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field: "date" });
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        value: trimmed.to_string(),
    })
}

pub(crate) fn score(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::ScoreOutOfRange { value })
    }
}

/// Amounts arrive signed so that negative input is reported instead of failing to decode.
pub(crate) fn amount(value: i64) -> Result<u64, ValidationError> {
    match u64::try_from(value) {
        Ok(0) | Err(_) => Err(ValidationError::NonPositiveAmount),
        Ok(v) if v > MAX_INVOICE_AMOUNT => Err(ValidationError::AmountTooLarge {
            max: MAX_INVOICE_AMOUNT,
        }),
        Ok(v) => Ok(v),
    }
}
