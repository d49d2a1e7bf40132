/// Represents ways to locate an element in the portal page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by CSS selector
    Css(String),
    /// Select using an XPath expression
    XPath(String),
    /// Select by DOM id
    Id(String),
    /// Select the innermost elements whose visible text contains the string (case-insensitive)
    Text(String),
    /// Select the innermost elements whose visible text equals the string after trimming
    ExactText(String),
    /// Keep current matches whose text contains the string (Playwright-style :has-text())
    HasText(String),
    /// Filter by visibility on screen
    Visible(bool),
    /// Select the n-th element from the matches, negative counts from the end
    Nth(i32),
    /// Chain multiple selectors
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css:{s}"),
            Selector::XPath(s) => write!(f, "xpath:{s}"),
            Selector::Id(s) => write!(f, "#{s}"),
            Selector::Text(s) => write!(f, "text:{s}"),
            Selector::ExactText(s) => write!(f, "exact:{s}"),
            Selector::HasText(s) => write!(f, "has-text:{s}"),
            Selector::Visible(v) => write!(f, "visible:{v}"),
            Selector::Nth(n) => write!(f, "nth:{n}"),
            Selector::Chain(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", rendered.join(" >> "))
            }
            Selector::Invalid(reason) => write!(f, "invalid({reason})"),
        }
    }
}

impl Selector {
    /// Returns the first invalid part of this selector, if any.
    pub fn invalid_reason(&self) -> Option<&str> {
        match self {
            Selector::Invalid(reason) => Some(reason),
            Selector::Chain(parts) => parts.iter().find_map(|p| p.invalid_reason()),
            _ => None,
        }
    }

    /// Appends `next` to this selector, flattening chains on both sides.
    pub fn then(&self, next: Selector) -> Selector {
        let mut chain = match self.clone() {
            Selector::Chain(existing) => existing,
            s => vec![s],
        };
        match next {
            Selector::Chain(mut parts) => chain.append(&mut parts),
            s => chain.push(s),
        }
        Selector::Chain(chain)
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        let lower = s.to_lowercase();
        match s {
            "" => Selector::Invalid("empty selector".to_string()),
            _ if lower.starts_with("css:") => Selector::Css(s[4..].trim().to_string()),
            _ if lower.starts_with("xpath:") => Selector::XPath(s[6..].trim().to_string()),
            _ if lower.starts_with("text:") => Selector::Text(s[5..].trim().to_string()),
            _ if lower.starts_with("text=") => Selector::Text(s[5..].trim().to_string()),
            _ if lower.starts_with("exact:") => Selector::ExactText(s[6..].trim().to_string()),
            _ if lower.starts_with("has-text:") => Selector::HasText(s[9..].trim().to_string()),
            _ if lower.starts_with("id:") => Selector::Id(s[3..].trim().to_string()),
            _ if lower.starts_with("visible:") => {
                let value = s[8..].trim().to_lowercase();
                Selector::Visible(value == "true")
            }
            _ if lower.starts_with("nth=") || lower.starts_with("nth:") => {
                let index_str = s[4..].trim();
                if let Ok(index) = index_str.parse::<i32>() {
                    Selector::Nth(index)
                } else {
                    Selector::Invalid(format!("Invalid index for nth selector: '{index_str}'"))
                }
            }
            _ if s.starts_with('/') || s.starts_with('(') => Selector::XPath(s.to_string()),
            // "#id" only when it is a plain identifier, otherwise it is a CSS compound
            _ if s.starts_with('#')
                && s.len() > 1
                && s[1..]
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_') =>
            {
                Selector::Id(s[1..].to_string())
            }
            _ => Selector::Css(s.to_string()),
        }
    }
}
