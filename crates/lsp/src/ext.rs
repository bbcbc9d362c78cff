//! Non-standard methods under the `experimental/` namespace.

use lsp_types::notification::Notification;
use lsp_types::request::Request;
use lsp_types::TextDocumentIdentifier;
use serde::{Deserialize, Serialize};

/// Text of a file the client cannot read itself, such as a class inside a
/// `jar:` archive.
pub enum ClassFileContents {}

impl Request for ClassFileContents {
    type Params = TextDocumentIdentifier;
    type Result = Option<String>;
    const METHOD: &'static str = "experimental/classFileContents";
}

/// Commands the client can run for a file.
pub enum Runnables {}

impl Request for Runnables {
    type Params = TextDocumentIdentifier;
    type Result = Option<Vec<RunnableSpec>>;
    const METHOD: &'static str = "experimental/runnables";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnableSpec {
    pub label: String,
    pub working_directory: String,
    pub command: String,
    pub args: Vec<String>,
}

/// Sent when the bound project starts (re)building its index.
pub enum IndexStarted {}

impl Notification for IndexStarted {
    type Params = ();
    const METHOD: &'static str = "experimental/indexStarted";
}

pub enum IndexFinished {}

impl Notification for IndexFinished {
    type Params = ();
    const METHOD: &'static str = "experimental/indexFinished";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runnable_serializes_in_camel_case() {
        let spec = RunnableSpec {
            label: "cargo test".into(),
            working_directory: "/p".into(),
            command: "cargo".into(),
            args: vec!["test".into()],
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["workingDirectory"], "/p");
        assert_eq!(json["args"][0], "test");
    }
}
