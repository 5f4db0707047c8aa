//! value provenance
//!
//! Every [crate::value::ConfigValue] carries an [Origin] describing where it
//! came from. Origins show up in error messages and (optionally) in rendered
//! output, but never participate in value equality.

/// Provenance record attached to every value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    description: String,
    resource: Option<String>,
    line: Option<usize>,
    comments: Vec<String>,
}

impl Origin {
    /// Origin for a value with a free-form source description
    pub fn new_simple(description: impl Into<String>) -> Self {
        Origin {
            description: description.into(),
            resource: None,
            line: None,
            comments: Vec::new(),
        }
    }

    /// Origin for a value loaded from a file
    pub fn new_file(path: &std::path::Path) -> Self {
        let rendered = path.display().to_string();
        Origin {
            description: rendered.clone(),
            resource: Some(rendered),
            line: None,
            comments: Vec::new(),
        }
    }

    pub fn with_line(&self, line: usize) -> Self {
        let mut o = self.clone();
        o.line = Some(line);
        o
    }

    pub fn with_comments(&self, comments: Vec<String>) -> Self {
        let mut o = self.clone();
        o.comments = comments;
        o
    }

    /// Origin describing the merge of two values
    pub fn merged(left: &Origin, right: &Origin) -> Self {
        if left == right {
            return left.clone();
        }

        Origin {
            description: format!("merge of {} and {}", left.description, right.description),
            resource: left.resource.clone().or_else(|| right.resource.clone()),
            line: left.line,
            comments: Vec::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}: {}", self.description, line),
            None => f.write_str(&self.description),
        }
    }
}
