use crate::dates::DateError;
use crate::leaderboard::{StoreError, ValidationError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use diesel::result::Error as DieselError;
use diesel_async::pooled_connection::bb8::RunError as BB8RunError;
use diesel_async::pooled_connection::PoolError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum ServiceError {
    InternalServerError(String),
    BadRequest(String),
    DatabaseError(String),
    NotFound(String),
    PoolError(String),
    StorageError(String),
}

impl ServiceError {
    fn from_diesel_error(error: DieselError) -> ServiceError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                log::error!("Database error: {:?} - Info: {}", kind, info.message());
                ServiceError::DatabaseError("A database operation failed.".to_string())
            }
            DieselError::NotFound => {
                ServiceError::NotFound("The requested record was not found.".to_string())
            }
            err => {
                log::error!("Unexpected Diesel error: {}", err);
                ServiceError::DatabaseError("An unexpected database error occurred.".to_string())
            }
        }
    }

    fn from_pool_error(error: PoolError) -> ServiceError {
        log::error!("Pool error: {:?}", error);
        ServiceError::PoolError("Could not connect to the database pool.".to_string())
    }

    fn from_bb8_run_error(error: BB8RunError) -> ServiceError {
        log::error!("BB8 connection pool error: {:?}", error);
        ServiceError::PoolError("Could not obtain connection from database pool.".to_string())
    }
}

impl From<DieselError> for ServiceError {
    fn from(error: DieselError) -> ServiceError {
        ServiceError::from_diesel_error(error)
    }
}

impl From<PoolError> for ServiceError {
    fn from(error: PoolError) -> ServiceError {
        ServiceError::from_pool_error(error)
    }
}

impl From<BB8RunError> for ServiceError {
    fn from(error: BB8RunError) -> ServiceError {
        ServiceError::from_bb8_run_error(error)
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> ServiceError {
        log::error!("Score store error: {}", error);
        ServiceError::StorageError("Failed to persist scores.".to_string())
    }
}

impl From<ValidationError> for ServiceError {
    fn from(error: ValidationError) -> ServiceError {
        ServiceError::BadRequest(error.to_string())
    }
}

impl From<DateError> for ServiceError {
    fn from(error: DateError) -> ServiceError {
        ServiceError::BadRequest(error.to_string())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ServiceError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ServiceError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            ServiceError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ServiceError::PoolError(msg) => write!(f, "Pool Error: {}", msg),
            ServiceError::StorageError(msg) => write!(f, "Storage Error: {}", msg),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match *self {
            ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::PoolError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        // Details of server errors were already logged where they were built.
        let user_facing_message = match status_code.as_u16() < 500 {
            true => self.to_string(),
            false => "An internal server error occurred. Please try again later.".to_string(),
        };

        if status_code.is_server_error() {
            log::error!(
                "Responding with server error ({}): {}",
                status_code,
                user_facing_message
            );
        } else {
            log::warn!(
                "Responding with client error ({}): {}",
                status_code,
                user_facing_message
            );
        }

        HttpResponse::build(status_code).json(json!({
            "status": "error",
            "statusCode": status_code.as_u16(),
            "message": user_facing_message
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use rstest::rstest;
    use serde_json::Value;

    async fn body_of(error: ServiceError) -> Value {
        let response = error.error_response();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[rstest]
    #[case(ServiceError::BadRequest("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(ServiceError::DatabaseError("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ServiceError::PoolError("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ServiceError::StorageError("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_variants_to_status(#[case] error: ServiceError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[actix_web::test]
    async fn client_errors_keep_their_message() {
        let body = body_of(ServiceError::from(ValidationError::EmptyName)).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["message"], "Bad Request: Name cannot be empty");
    }

    #[actix_web::test]
    async fn server_errors_hide_details() {
        let body = body_of(ServiceError::InternalServerError("secret".into())).await;
        assert_eq!(body["statusCode"], 500);
        assert!(!body["message"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn diesel_not_found_becomes_404() {
        let error = ServiceError::from(DieselError::NotFound);
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_dates_are_client_errors() {
        let error = ServiceError::from(DateError::Invalid("soon".into()));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }
}
