//! Parsing of the `Link` response header GitHub uses for pagination.
//!
//! ```text
//! Link: <https://api.github.com/search/issues?q=x&page=2>; rel="next",
//!       <https://api.github.com/search/issues?q=x&page=5>; rel="last"
//! ```

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub rels: Vec<String>,
}

/// Parse every link-value in a `Link` header.
///
/// Malformed trailing input is dropped; whatever parsed cleanly before it is
/// returned.
pub fn parse_link_header(header: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut rest = header;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        let Some(after_open) = rest.strip_prefix('<') else {
            break;
        };
        let Some(close) = after_open.find('>') else {
            break;
        };
        let url = after_open[..close].trim().to_string();
        rest = &after_open[close + 1..];

        let mut rels = Vec::new();
        while let Some(param) = rest.trim_start().strip_prefix(';') {
            let param = param.trim_start();
            let name_end = param
                .find(|c: char| c == '=' || c == ';' || c == ',')
                .unwrap_or(param.len());
            let name = param[..name_end].trim().to_ascii_lowercase();
            rest = &param[name_end..];

            let mut value = "";
            if let Some(raw) = rest.strip_prefix('=') {
                let raw = raw.trim_start();
                if let Some(quoted) = raw.strip_prefix('"') {
                    match quoted.find('"') {
                        Some(end) => {
                            value = &quoted[..end];
                            rest = &quoted[end + 1..];
                        }
                        None => {
                            value = quoted;
                            rest = "";
                        }
                    }
                } else {
                    let end = raw.find(|c: char| c == ';' || c == ',').unwrap_or(raw.len());
                    value = raw[..end].trim();
                    rest = &raw[end..];
                }
            }

            if name == "rel" {
                rels.extend(value.split_whitespace().map(str::to_ascii_lowercase));
            }
        }

        links.push(Link { url, rels });
    }

    links
}

/// URL of the first link carrying `rel="next"`, if any.
pub fn next_link(header: &str) -> Option<String> {
    parse_link_header(header)
        .into_iter()
        .find(|link| link.rels.iter().any(|rel| rel == "next"))
        .map(|link| link.url)
}
