use crate::errors::AutomationError;
use crate::row::REQUIRED_COLUMNS;

/// Returns the required columns absent from `columns`, in template order.
/// Names are compared case-sensitively; extra columns are ignored.
pub fn missing_columns<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c.as_ref() == **required))
        .map(|s| s.to_string())
        .collect()
}

/// Fails with [`AutomationError::Schema`] naming every missing column.
pub fn validate_columns<S: AsRef<str>>(columns: &[S]) -> Result<(), AutomationError> {
    let missing = missing_columns(columns);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AutomationError::Schema { missing })
    }
}
