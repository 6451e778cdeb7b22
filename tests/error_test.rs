use std::time::Duration;

use finsent::{FinsentError, ModelStage, Result};

#[test]
fn test_error_display() {
    let err = FinsentError::ModelNotFound("ProsusAI/finbert".to_string());
    assert!(err.to_string().contains("ProsusAI/finbert"));
}

#[test]
fn test_input_format_display_includes_line() {
    let err = FinsentError::input_format(Some(7), "missing column `label`");
    assert_eq!(
        err.to_string(),
        "input format error at line 7: missing column `label`"
    );

    let err = FinsentError::input_format(None, "empty file");
    assert_eq!(err.to_string(), "input format error: empty file");
}

#[test]
fn test_external_model_display_includes_stage() {
    let err = FinsentError::external(ModelStage::Tokenize, "bad vocab");
    assert_eq!(
        err.to_string(),
        "external model error during tokenize: bad vocab"
    );
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(FinsentError::UnrecognizedLabel("bullish".into()))
    }
    assert!(returns_error().is_err());
}

#[test]
fn test_io_error_converts() {
    fn open() -> Result<String> {
        Ok(std::fs::read_to_string("/nonexistent/finsent/file")?)
    }
    assert!(matches!(open(), Err(FinsentError::Io(_))));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(FinsentError::RateLimited { retry_after: None }.is_transient());
    assert!(
        FinsentError::RateLimited {
            retry_after: Some(Duration::from_secs(1))
        }
        .is_transient()
    );
    assert!(FinsentError::http(ModelStage::Infer, "connection reset").is_transient());
    assert!(FinsentError::EmptyResponse.is_transient());
    for status in [500, 502, 503, 504] {
        assert!(
            FinsentError::Api {
                stage: ModelStage::Infer,
                status,
                message: "server error".into()
            }
            .is_transient()
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(!FinsentError::AuthenticationFailed.is_transient());
    assert!(!FinsentError::ModelNotFound("m".into()).is_transient());
    assert!(!FinsentError::UnrecognizedLabel("x".into()).is_transient());
    assert!(!FinsentError::external(ModelStage::Train, "exit 1").is_transient());
    assert!(
        !FinsentError::Api {
            stage: ModelStage::Load,
            status: 400,
            message: "bad request".into()
        }
        .is_transient()
    );
}

#[test]
fn retry_after_hint() {
    let err = FinsentError::RateLimited {
        retry_after: Some(Duration::from_secs(3)),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    assert_eq!(FinsentError::http(ModelStage::Load, "x").retry_after(), None);
}

// ============================================================================
// Boundary stage
// ============================================================================

#[test]
fn boundary_errors_report_their_stage() {
    let err = FinsentError::http(ModelStage::Load, "connection refused");
    assert_eq!(err.stage(), Some(ModelStage::Load));
    assert_eq!(
        err.to_string(),
        "HTTP error during load: connection refused"
    );

    let err = FinsentError::Api {
        stage: ModelStage::Infer,
        status: 502,
        message: "bad gateway".into(),
    };
    assert_eq!(err.stage(), Some(ModelStage::Infer));
    assert!(err.to_string().contains("during infer"));

    assert_eq!(
        FinsentError::external(ModelStage::Train, "exit 1").stage(),
        Some(ModelStage::Train)
    );
    assert_eq!(FinsentError::AuthenticationFailed.stage(), None);
}
