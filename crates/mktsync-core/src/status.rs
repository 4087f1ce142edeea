//! Order status predicates shared by reports.

/// `true` for any cancellation status (`cancelled`, `cancelado`, ...).
#[must_use]
pub fn is_cancelled(status: &str) -> bool {
    let lower = status.to_lowercase();
    lower.contains("cancel")
}

/// `true` for paid/completed statuses (`paid`, `pago`, `completed`).
#[must_use]
pub fn is_paid(status: &str) -> bool {
    let lower = status.to_lowercase();
    lower.contains("pag") || lower.contains("paid") || lower == "completed"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_variants() {
        assert!(is_cancelled("cancelled"));
        assert!(is_cancelled("Cancelado"));
        assert!(!is_cancelled("paid"));
        assert!(!is_cancelled(""));
    }

    #[test]
    fn paid_variants() {
        assert!(is_paid("paid"));
        assert!(is_paid("Pago"));
        assert!(is_paid("completed"));
        assert!(!is_paid("confirmed"));
        assert!(!is_paid(""));
    }
}
