//! Unpaywall open-access resolver.
//!
//! Maps a DOI to the best open-access PDF location. The service requires a
//! contact email on every request, so callers pass the `UNPAYWALL_EMAIL`
//! value through; no email, no lookups.

use super::*;

/// Version 2 endpoint prefix.
const API_URL: &str = "https://api.unpaywall.org/v2";

/// Best open-access PDF URL for a DOI, when one exists.
pub async fn best_pdf_url(doi: &str, email: &str) -> Result<Option<String>> {
  let client = reqwest::Client::builder().user_agent(SOURCE_USER_AGENT).build()?;
  let response =
    client.get(format!("{API_URL}/{doi}")).query(&[("email", email)]).send().await?;
  if !response.status().is_success() {
    debug!(doi, status = response.status().as_u16(), "unpaywall lookup failed");
    return Ok(None);
  }
  let body: Value = response.json().await?;
  Ok(parse_best_pdf(&body))
}

/// Picks the PDF (or landing) URL out of the best OA location.
fn parse_best_pdf(body: &Value) -> Option<String> {
  let best = body.get("best_oa_location")?;
  best
    .get("url_for_pdf")
    .and_then(Value::as_str)
    .or_else(|| best.get("url").and_then(Value::as_str))
    .map(String::from)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefers_the_pdf_url_over_the_landing_page() {
    let body = json!({
      "best_oa_location": { "url_for_pdf": "https://x/p.pdf", "url": "https://x/landing" }
    });
    assert_eq!(parse_best_pdf(&body).as_deref(), Some("https://x/p.pdf"));

    let landing_only = json!({ "best_oa_location": { "url": "https://x/landing" } });
    assert_eq!(parse_best_pdf(&landing_only).as_deref(), Some("https://x/landing"));

    assert_eq!(parse_best_pdf(&json!({})), None);
  }
}
