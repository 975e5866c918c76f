/// Credentials and endpoint for one authenticated API session.
///
/// Passed explicitly into the HTTP client rather than read from ambient
/// global state, so two sessions (different orgs, different regions) can
/// coexist in one process.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: String,
    token: String,
}

impl Session {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            token: token.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_normalized() {
        let s = Session::new("https://api.example.com/", "tok");
        assert_eq!(s.url("/api/v2/users/u1"), "https://api.example.com/api/v2/users/u1");
    }

    #[test]
    fn bearer_header_value() {
        let s = Session::new("https://api.example.com", "abc123");
        assert_eq!(s.bearer(), "Bearer abc123");
    }
}
