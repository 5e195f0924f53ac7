use serde::Serialize;

/// Outcome of the "Validate" action.
///
/// The action acknowledges the input against the selected practice; it
/// performs no comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationEcho {
    pub input: String,
    pub practice: String,
    pub message: String,
}

impl ValidationEcho {
    pub fn new(input: &str, practice_label: &str) -> Self {
        Self {
            input: input.to_string(),
            practice: practice_label.to_string(),
            message: format!(
                "Validation: Input '{}' validated against '{}'.",
                input, practice_label
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_names_input_and_practice() {
        let echo = ValidationEcho::new("We use MFA", "AC.L2-3.1.1 - Authorized Access Control");
        assert_eq!(
            echo.message,
            "Validation: Input 'We use MFA' validated against 'AC.L2-3.1.1 - Authorized Access Control'."
        );
    }
}
