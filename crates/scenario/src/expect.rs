//! Response predicates

use regex::Regex;

use crate::session::HttpResponse;
use crate::spec::Expectation;

/// First predicate a response failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: String,
    pub actual: String,
}

impl Expectation {
    /// Check `resp` against every predicate, stopping at the first failure.
    pub fn check(&self, resp: &HttpResponse) -> Result<(), Mismatch> {
        if !self.status.is_empty() && !self.status.contains(&resp.status) {
            return Err(Mismatch {
                expected: format!("status in {:?}", self.status),
                actual: match &resp.location {
                    Some(location) => format!("status {} (Location: {})", resp.status, location),
                    None => format!("status {}", resp.status),
                },
            });
        }

        for needle in &self.contains {
            if !resp.body.contains(needle.as_str()) {
                return Err(Mismatch {
                    expected: format!("body containing {:?}", needle),
                    actual: "body without it".to_string(),
                });
            }
        }

        for group in &self.contains_any {
            if !group.iter().any(|needle| resp.body.contains(needle.as_str())) {
                return Err(Mismatch {
                    expected: format!("body containing one of {:?}", group),
                    actual: "body with none of them".to_string(),
                });
            }
        }

        for name in &self.inputs {
            if !has_element(&resp.body, "input", name) {
                return Err(Mismatch {
                    expected: format!("<input name=\"{}\">", name),
                    actual: "no such input field".to_string(),
                });
            }
        }

        for name in &self.controls {
            if !has_element(&resp.body, "input", name) && !has_element(&resp.body, "select", name) {
                return Err(Mismatch {
                    expected: format!("<input> or <select> named \"{}\"", name),
                    actual: "no such form control".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Whether `html` has a `<tag ... name="field" ...>` element.
pub fn has_element(html: &str, tag: &str, field: &str) -> bool {
    let pattern = format!(
        r#"(?i)<{}[^>]*[\s"']name\s*=\s*["']{}["'][^>]*>"#,
        regex::escape(tag),
        regex::escape(field)
    );
    Regex::new(&pattern)
        .map(|re| re.is_match(html))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            location: None,
            body: body.to_string(),
        }
    }

    #[test_case(r#"<input type="text" name="username">"#, "input", "username", true ; "double quotes")]
    #[test_case(r#"<input name='symbol' autofocus>"#, "input", "symbol", true ; "single quotes")]
    #[test_case(r#"<INPUT NAME="shares" />"#, "input", "shares", true ; "upper case")]
    #[test_case(r#"<select class="form-select" name="symbol"><option>AAAA</option></select>"#, "select", "symbol", true ; "select element")]
    #[test_case(r#"<input name="username_confirm">"#, "input", "username", false ; "prefix only")]
    #[test_case(r#"<input id="username">"#, "input", "username", false ; "id not name")]
    #[test_case(r#"<input data-name="password">"#, "input", "password", false ; "data attribute")]
    #[test_case(r#"<select name="symbol"></select>"#, "input", "symbol", false ; "wrong tag")]
    fn test_has_element(html: &str, tag: &str, field: &str, expected: bool) {
        assert_eq!(has_element(html, tag, field), expected);
    }

    #[test]
    fn test_status_mismatch_reports_location() {
        let expect = Expectation {
            status: vec![200],
            ..Default::default()
        };
        let mut resp = response(302, "");
        resp.location = Some("/login".to_string());

        let mismatch = expect.check(&resp).unwrap_err();
        assert_eq!(mismatch.expected, "status in [200]");
        assert_eq!(mismatch.actual, "status 302 (Location: /login)");
    }

    #[test]
    fn test_empty_status_accepts_anything() {
        let expect = Expectation::default();
        assert!(expect.check(&response(500, "")).is_ok());
    }

    #[test]
    fn test_contains_all() {
        let expect = Expectation {
            status: vec![200],
            contains: vec!["AAAA".to_string(), "112".to_string()],
            ..Default::default()
        };
        assert!(expect.check(&response(200, "AAAA 4 $112.00")).is_ok());

        let mismatch = expect.check(&response(200, "AAAA 4 $28.00")).unwrap_err();
        assert_eq!(mismatch.expected, "body containing \"112\"");
    }

    #[test]
    fn test_contains_any_group() {
        let expect = Expectation {
            contains_any: vec![vec!["9,888".to_string(), "9888".to_string()]],
            ..Default::default()
        };
        assert!(expect.check(&response(200, "Cash $9,888.00")).is_ok());
        assert!(expect.check(&response(200, "Cash 9888.0")).is_ok());
        assert!(expect.check(&response(200, "Cash $10,000.00")).is_err());
    }

    #[test]
    fn test_controls_accept_select() {
        let expect = Expectation {
            controls: vec!["symbol".to_string()],
            inputs: vec!["shares".to_string()],
            ..Default::default()
        };
        let body = r#"<form><select name="symbol"></select><input name="shares" type="number"></form>"#;
        assert!(expect.check(&response(200, body)).is_ok());

        let body = r#"<form><select name="symbol"></select></form>"#;
        let mismatch = expect.check(&response(200, body)).unwrap_err();
        assert_eq!(mismatch.expected, "<input name=\"shares\">");
    }
}
