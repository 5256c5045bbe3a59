/// Helper function to validate email format
pub fn is_valid_email(email: &str) -> bool {
    // Basic email validation
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(' ')
        && !domain.contains('@')
        && email.len() >= 5
}
