// ==========================================
// Dental Lab Flow - API Error Types
// ==========================================
// Errors crossing the outer boundary. Lower-layer errors are folded
// into the categories a caller can act on; the original message is
// preserved in the payload.
// ==========================================

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::engine::WorkflowError;
use crate::repository::error::RepositoryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("insufficient stock for {material_id}: requested {requested}, available {available}")]
    InsufficientStock {
        material_id: String,
        requested: f64,
        available: f64,
    },

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::InsufficientStock {
                material_id,
                requested,
                available,
            } => ApiError::InsufficientStock {
                material_id,
                requested,
                available,
            },
            RepositoryError::InvalidStateTransition { .. } => {
                ApiError::InvalidTransition(err.to_string())
            }
            RepositoryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::LockError(_)
            | RepositoryError::DatabaseTransactionError(_)
            | RepositoryError::DatabaseQueryError(_)
            | RepositoryError::UniqueConstraintViolation(_)
            | RepositoryError::ForeignKeyViolation(_) => ApiError::DatabaseError(err.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::TemplateNotFound(p) => ApiError::TemplateNotFound(p.to_string()),
            WorkflowError::NotFound(id) => ApiError::NotFound(format!("workflow {}", id)),
            WorkflowError::InvalidTransition { .. } => {
                ApiError::InvalidTransition(err.to_string())
            }
            WorkflowError::Repository(inner) => inner.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::TemplateNotFound(p) => ApiError::TemplateNotFound(p.to_string()),
            other => ApiError::InvalidInput(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_maps_to_its_own_variant() {
        let repo_err = RepositoryError::InsufficientStock {
            material_id: "mat-1".to_string(),
            requested: 5.0,
            available: 2.0,
        };
        match ApiError::from(repo_err) {
            ApiError::InsufficientStock {
                material_id,
                requested,
                available,
            } => {
                assert_eq!(material_id, "mat-1");
                assert_eq!(requested, 5.0);
                assert_eq!(available, 2.0);
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn workflow_not_found_maps_to_not_found() {
        let err = WorkflowError::NotFound("wf-9".to_string());
        assert!(matches!(ApiError::from(err), ApiError::NotFound(_)));
    }
}
