use proptest::prelude::*;
use sdk::errors::{EngineError, ForgeErrorExt, UpstreamError};
use sdk::types::{ParameterSpec, ToolDeclaration};

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-z]{12,40}") {
        // Hints are static strings: never empty, never echoing the raw detail
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Database(error_str.clone()),
            EngineError::Upstream(UpstreamError::ProviderUnavailable(error_str.clone())),
            EngineError::Upstream(UpstreamError::AuthenticationFailed(error_str.clone())),
            EngineError::Upstream(UpstreamError::Parse(error_str.clone())),
            EngineError::ProviderNotConfigured(error_str.clone()),
            EngineError::SessionBusy(error_str.clone()),
            EngineError::SessionNotFound(error_str.clone()),
            EngineError::Validation(error_str.clone()),
            EngineError::MemoryNotFound(error_str.clone()),
            EngineError::PathDenied(std::path::PathBuf::from(&error_str)),
            EngineError::KeyringError(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }

    #[test]
    fn test_required_params_sorted_and_complete(
        names in prop::collection::btree_set("[a-z]{1,8}", 0..8),
    ) {
        let mut declaration = ToolDeclaration::new("tool", "A tool");
        for name in names.iter().rev() {
            declaration = declaration.with_param(name.clone(), ParameterSpec::required_string("p"));
        }

        let required = declaration.required_params();
        let expected: Vec<&str> = names.iter().map(String::as_str).collect();
        prop_assert_eq!(required, expected);
    }
}
