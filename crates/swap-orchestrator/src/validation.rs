use crate::{
    error::AmountError,
    registry::{TokenInfo, parse_units},
};

/// Validates the amount typed for `token` against the known balance of that
/// token, returning the amount in the token's smallest denomination.
///
/// The balance check is skipped when no balance is known.
pub fn validate_amount(
    amount: &str,
    token: &TokenInfo,
    balance: Option<u128>,
) -> Result<u128, AmountError> {
    let units = parse_units(amount, token.decimals)?;
    match balance {
        Some(balance) if units > balance => Err(AmountError::InsufficientBalance {
            symbol: token.symbol.clone(),
            balance,
        }),
        _ => Ok(units),
    }
}

/// Validates an amount before an input token was selected: it only has to be
/// a positive decimal number.
pub fn validate_decimal(amount: &str) -> Result<(), AmountError> {
    // Any precision is acceptable until the token's decimals are known
    match parse_units(amount, 0) {
        Ok(_) | Err(AmountError::TooPrecise { .. } | AmountError::TooLarge) => Ok(()),
        Err(e) => Err(e),
    }
}
