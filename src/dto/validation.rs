//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dto::tournament::BlindLevelInput;

/// Rejects a level whose big blind does not exceed its small blind.
///
/// Break levels may carry `0/0` blinds.
pub fn validate_blind_order(level: &BlindLevelInput) -> Result<(), ValidationError> {
    let both_zero = level.small_blind == 0 && level.big_blind == 0;
    if both_zero || level.big_blind > level.small_blind {
        return Ok(());
    }

    let mut err = ValidationError::new("blind_order");
    err.message = Some(
        format!(
            "level {}: big blind {} must exceed small blind {}",
            level.index, level.big_blind, level.small_blind
        )
        .into(),
    );
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(small_blind: u64, big_blind: u64) -> BlindLevelInput {
        BlindLevelInput {
            index: 0,
            small_blind,
            big_blind,
            ante: 0,
            duration_seconds: 600,
            is_pause: false,
        }
    }

    #[test]
    fn test_validate_blind_order() {
        assert!(validate_blind_order(&level(25, 50)).is_ok());
        assert!(validate_blind_order(&level(0, 0)).is_ok());
        assert!(validate_blind_order(&level(50, 50)).is_err());
        assert!(validate_blind_order(&level(100, 50)).is_err());
    }
}
