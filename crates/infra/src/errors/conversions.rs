//! Conversions from external infrastructure errors into domain errors.

use dayplan_domain::DayplanError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub DayplanError);

impl From<InfraError> for DayplanError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<DayplanError> for InfraError {
    fn from(value: DayplanError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoDayplanError {
    fn into_dayplan(self) -> DayplanError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → DayplanError */
/* -------------------------------------------------------------------------- */

impl IntoDayplanError for SqlError {
    fn into_dayplan(self) -> DayplanError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        DayplanError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        DayplanError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        DayplanError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        DayplanError::Database("foreign key constraint violation".into())
                    }
                    _ => DayplanError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => DayplanError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                DayplanError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                DayplanError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => DayplanError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidParameterName(parameter_name) => {
                DayplanError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => {
                DayplanError::Database(format!("invalid database path: {}", path.to_string_lossy()))
            }
            RE::InvalidQuery => DayplanError::Database("invalid SQL query".into()),
            other => DayplanError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_dayplan())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → DayplanError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(DayplanError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → DayplanError */
/* -------------------------------------------------------------------------- */

impl IntoDayplanError for HttpError {
    fn into_dayplan(self) -> DayplanError {
        if self.is_timeout() {
            return DayplanError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return DayplanError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => DayplanError::Auth(message),
                404 => DayplanError::NotFound(message),
                410 => DayplanError::SyncTokenInvalid(message),
                429 => DayplanError::RateLimited(message),
                400..=499 => DayplanError::InvalidInput(message),
                _ => DayplanError::Network(message),
            };
        }

        DayplanError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_dayplan())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
