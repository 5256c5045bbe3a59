use uuid::Uuid;

/// Generate an opaque verification token: 122 random bits rendered as a
/// hyphenated UUID string
pub fn generate_verification_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_format() {
        let token = generate_verification_token();

        assert_eq!(token.len(), 36);
        assert_eq!(token.matches('-').count(), 4);
        assert!(Uuid::parse_str(&token).is_ok());
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_verification_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
