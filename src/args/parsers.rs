use crate::error::ValidationError;

pub(crate) fn parse_positive_u64(s: &str) -> Result<u64, ValidationError> {
    match s.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        Ok(_) | Err(_) => Err(ValidationError::InvalidPositive {
            value: s.to_owned(),
        }),
    }
}
