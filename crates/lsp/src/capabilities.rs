use lsp_types::{
    CodeActionKind, CodeActionOptions, CodeActionProviderCapability, CompletionOptions,
    CompletionOptionsCompletionItem, DocumentOnTypeFormattingOptions, FileOperationFilter,
    FileOperationPattern, FileOperationRegistrationOptions, HoverProviderCapability, OneOf,
    SaveOptions, ServerCapabilities, SignatureHelpOptions, TextDocumentSyncCapability,
    TextDocumentSyncKind, TextDocumentSyncOptions, TextDocumentSyncSaveOptions,
    WorkspaceFileOperationsServerCapabilities, WorkspaceServerCapabilities,
};

/// Characters besides `;` that trigger on-type formatting.
const ON_TYPE_TRIGGERS: &[&str] = &[
    "}", ")", "]", ">", ":", ",", ".", "@", "#", "?", "=", "!", " ", "|", "&", "$", "^", "%",
    "*", "/",
];

fn strings(chars: &[&str]) -> Vec<String> {
    chars.iter().map(|c| (*c).to_owned()).collect()
}

/// Capabilities announced in every `initialize` response of a bound session.
pub fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::INCREMENTAL),
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(true),
                })),
                ..Default::default()
            },
        )),
        workspace: Some(WorkspaceServerCapabilities {
            workspace_folders: None,
            file_operations: Some(WorkspaceFileOperationsServerCapabilities {
                did_rename: Some(FileOperationRegistrationOptions {
                    filters: vec![FileOperationFilter {
                        scheme: Some("file".into()),
                        pattern: FileOperationPattern {
                            glob: "**/*".into(),
                            matches: None,
                            options: None,
                        },
                    }],
                }),
                ..Default::default()
            }),
        }),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        completion_provider: Some(CompletionOptions {
            trigger_characters: Some(strings(&[".", "@"])),
            resolve_provider: Some(true),
            completion_item: Some(CompletionOptionsCompletionItem {
                label_details_support: Some(true),
            }),
            ..Default::default()
        }),
        signature_help_provider: Some(SignatureHelpOptions {
            trigger_characters: Some(strings(&["(", "["])),
            ..Default::default()
        }),
        definition_provider: Some(OneOf::Left(true)),
        type_definition_provider: Some(lsp_types::TypeDefinitionProviderCapability::Simple(true)),
        implementation_provider: Some(lsp_types::ImplementationProviderCapability::Simple(true)),
        references_provider: Some(OneOf::Left(true)),
        document_highlight_provider: Some(OneOf::Left(true)),
        document_symbol_provider: Some(OneOf::Left(true)),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        document_formatting_provider: Some(OneOf::Left(true)),
        document_range_formatting_provider: Some(OneOf::Left(true)),
        document_on_type_formatting_provider: Some(DocumentOnTypeFormattingOptions {
            first_trigger_character: ";".into(),
            more_trigger_character: Some(strings(ON_TYPE_TRIGGERS)),
        }),
        rename_provider: Some(OneOf::Left(true)),
        code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
            code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
            resolve_provider: Some(true),
            ..Default::default()
        })),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announced_capabilities() {
        let caps = serde_json::to_value(server_capabilities()).unwrap();
        assert_eq!(caps["textDocumentSync"]["change"], 2);
        assert_eq!(caps["textDocumentSync"]["save"]["includeText"], true);
        assert_eq!(caps["completionProvider"]["resolveProvider"], true);
        assert_eq!(
            caps["completionProvider"]["triggerCharacters"],
            serde_json::json!([".", "@"])
        );
        assert_eq!(
            caps["signatureHelpProvider"]["triggerCharacters"],
            serde_json::json!(["(", "["])
        );
        assert_eq!(
            caps["documentOnTypeFormattingProvider"]["firstTriggerCharacter"],
            ";"
        );
        assert_eq!(
            caps["codeActionProvider"]["codeActionKinds"],
            serde_json::json!(["quickfix"])
        );
        assert_eq!(
            caps["workspace"]["fileOperations"]["didRename"]["filters"][0]["pattern"]["glob"],
            "**/*"
        );
    }
}
