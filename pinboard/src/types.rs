/// Identifier assigned to a user by the credential store on creation.
pub type UserId = i32;

/// Shorten an opaque token for log output, keeping only its first characters.
pub fn abbrev_token(token: &str) -> &str {
    let end = token.char_indices().nth(8).map(|(i, _)| i).unwrap_or(token.len());
    &token[..end]
}
