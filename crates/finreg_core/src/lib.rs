pub mod cache;
pub mod compliance;
pub mod config;
pub mod db;
pub mod demo;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod query_log;

#[cfg(test)]
mod tests {
    use super::error::{codes, AppError};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new(codes::GENERATION_FAILED, "generation failed")
            .with_details("timeout")
            .with_retryable(true);
        assert_eq!(err.code, "GENERATION_FAILED");
        assert!(err.is(codes::GENERATION_FAILED));
        assert!(err.retryable);
        assert_eq!(err.to_string(), "[GENERATION_FAILED] generation failed (timeout)");
    }
}
