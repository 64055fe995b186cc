//! Validation collaborator contract
//!
//! The rule grammar belongs to the implementation. The context only needs
//! field-keyed messages back so it can replay them, together with the
//! submitted values, on the next render.

use std::collections::HashMap;

/// Field name to error message; empty means valid
pub type FieldErrors = HashMap<String, String>;

pub trait Validator: Send + Sync {
    fn validate(
        &self,
        rules: &HashMap<String, String>,
        data: &HashMap<String, String>,
    ) -> FieldErrors;
}

impl<F> Validator for F
where
    F: Fn(&HashMap<String, String>, &HashMap<String, String>) -> FieldErrors + Send + Sync,
{
    fn validate(
        &self,
        rules: &HashMap<String, String>,
        data: &HashMap<String, String>,
    ) -> FieldErrors {
        self(rules, data)
    }
}
