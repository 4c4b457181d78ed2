use std::fmt;

/// What a [`Message`] is about. Each category has a stable snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    NoPayloadManifest,
    NoBagitTxt,
    WrongVersion,
    PayloadNotInPayloadDirectory,
    TagInPayloadManifest,
    PayloadFileNotInPayloadManifest,
    PayloadManifestContainsMissingFile,
    TagManifestContainsMissingFile,
    PayloadManifestContainsInvalidFile,
    TagManifestContainsInvalidFile,
    DirectoryNotAllowedInBagDir,
    MissingFetchTxt,
    FetchTargetAlreadyPresent,
    FetchPathOutsideBag,
    FetchFailed,
    FetchVerifyFailed,
    TransferCancelled,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::NoPayloadManifest => "no_payload_manifest",
            Category::NoBagitTxt => "no_bagittxt",
            Category::WrongVersion => "wrong_version",
            Category::PayloadNotInPayloadDirectory => "payload_not_in_payload_directory",
            Category::TagInPayloadManifest => "tag_in_payload_manifest",
            Category::PayloadFileNotInPayloadManifest => "payload_file_not_in_payload_manifest",
            Category::PayloadManifestContainsMissingFile => "payload_manifest_contains_missing_file",
            Category::TagManifestContainsMissingFile => "tag_manifest_contains_missing_file",
            Category::PayloadManifestContainsInvalidFile => "payload_manifest_contains_invalid_file",
            Category::TagManifestContainsInvalidFile => "tag_manifest_contains_invalid_file",
            Category::DirectoryNotAllowedInBagDir => "directory_not_allowed_in_bag_dir",
            Category::MissingFetchTxt => "missing_fetchtxt",
            Category::FetchTargetAlreadyPresent => "fetch_target_already_present",
            Category::FetchPathOutsideBag => "fetch_path_outside_bag",
            Category::FetchFailed => "fetch_failed",
            Category::FetchVerifyFailed => "fetch_verify_failed",
            Category::TransferCancelled => "transfer_cancelled",
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(
            self,
            Category::PayloadManifestContainsMissingFile | Category::TagManifestContainsMissingFile
        )
    }

    pub fn is_invalid(self) -> bool {
        matches!(
            self,
            Category::PayloadManifestContainsInvalidFile | Category::TagManifestContainsInvalidFile
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub category: Category,
    pub text:     String,
    /// The bag-relative path or directory the message is about.
    pub subject:  Option<String>,
}

impl Message {
    pub fn new(category: Category, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
            subject: None,
        }
    }

    pub fn about(category: Category, subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
            subject: Some(subject.into()),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "[{}] {}", self.category, self.text) }
}

/// Outcome of a verification or a fetch.
///
/// `success` is false exactly when there is at least one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    pub success:  bool,
    pub messages: Vec<Message>,
}

impl VerifyResult {
    pub fn ok() -> Self {
        Self {
            success:  true,
            messages: Vec::new(),
        }
    }

    pub fn fail(message: Message) -> Self {
        Self {
            success:  false,
            messages: vec![message],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.success = false;
        self.messages.push(message);
    }

    pub fn merge(&mut self, other: VerifyResult) {
        self.success &= other.success;
        self.messages.extend(other.messages);
    }

    pub fn has(&self, category: Category) -> bool { self.messages.iter().any(|m| m.category == category) }

    /// Subjects of messages that report a manifest-listed file as missing.
    pub fn missing_files(&self) -> impl Iterator<Item = &str> {
        self.subjects(|c| c.is_missing())
    }

    /// Subjects of messages that report a fixity mismatch.
    pub fn invalid_files(&self) -> impl Iterator<Item = &str> {
        self.subjects(|c| c.is_invalid())
    }

    pub fn is_missing_or_invalid(&self, path: &str) -> bool {
        self.messages.iter().any(|m| {
            (m.category.is_missing() || m.category.is_invalid()) && m.subject.as_deref() == Some(path)
        })
    }

    fn subjects(&self, pick: impl Fn(Category) -> bool) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(move |m| pick(m.category))
            .filter_map(|m| m.subject.as_deref())
    }
}

impl Default for VerifyResult {
    fn default() -> Self { Self::ok() }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            return f.write_str("Result is true.");
        }
        write!(f, "Result is false.")?;
        for message in &self.messages {
            write!(f, "\n  {message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_queries() {
        let mut result = VerifyResult::ok();
        assert!(result.success);
        result.merge(VerifyResult::ok());
        assert!(result.success);

        result.merge(VerifyResult::fail(Message::about(
            Category::PayloadManifestContainsMissingFile,
            "data/gone.txt",
            "data/gone.txt is missing",
        )));
        result.push(Message::about(
            Category::TagManifestContainsInvalidFile,
            "bag-info.txt",
            "bag-info.txt does not match",
        ));
        assert!(!result.success);
        assert_eq!(result.missing_files().collect::<Vec<_>>(), vec!["data/gone.txt"]);
        assert_eq!(result.invalid_files().collect::<Vec<_>>(), vec!["bag-info.txt"]);
        assert!(result.is_missing_or_invalid("bag-info.txt"));
        assert!(!result.is_missing_or_invalid("data/a.txt"));
        assert!(result.has(Category::TagManifestContainsInvalidFile));
    }

    #[test]
    fn test_display_lists_messages() {
        let result = VerifyResult::fail(Message::new(Category::NoBagitTxt, "bagit.txt is missing"));
        assert_eq!(result.to_string(), "Result is false.\n  [no_bagittxt] bagit.txt is missing");
        assert_eq!(VerifyResult::ok().to_string(), "Result is true.");
    }
}
