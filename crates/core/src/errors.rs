use thiserror::Error;

use crate::flows::FlowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("lead not found: {0}")]
    LeadNotFound(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// How a failure should be treated by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Misconfiguration: abort the request or cycle, never retry automatically.
    Fatal,
    /// The user or the next poll can recover from it.
    Recoverable,
    /// Record it and keep going.
    BestEffort,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Recoverable => "recoverable",
            Self::BestEffort => "best_effort",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<FlowError> for ApplicationError {
    fn from(value: FlowError) -> Self {
        Self::Domain(DomainError::Flow(value))
    }
}

impl ApplicationError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Configuration(_) => ErrorSeverity::Fatal,
            Self::Domain(DomainError::Flow(error)) if error.is_configuration() => {
                ErrorSeverity::Fatal
            }
            Self::Domain(_) => ErrorSeverity::Recoverable,
            Self::Persistence(_) => ErrorSeverity::Recoverable,
            Self::Integration(_) => ErrorSeverity::BestEffort,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "No pudimos procesar tu solicitud. Revisa los datos e intenta de nuevo.",
            Self::NotFound { .. } => "No encontramos el caso solicitado.",
            Self::ServiceUnavailable { .. } => {
                "El servicio no está disponible por el momento. Intenta de nuevo en unos minutos."
            }
            Self::Internal { .. } => "Ocurrió un error inesperado. Intenta más tarde.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::LeadNotFound(id)) => {
                Self::NotFound { message: format!("lead {id}"), correlation_id: unassigned }
            }
            ApplicationError::Domain(DomainError::Flow(error)) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: unassigned,
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, ErrorSeverity, InterfaceError};
    use crate::flows::FlowError;

    #[test]
    fn missing_default_step_is_fatal_and_internal() {
        let error = ApplicationError::from(FlowError::MissingDefaultStep {
            requested: "INICIO".to_owned(),
        });
        assert_eq!(error.severity(), ErrorSeverity::Fatal);

        let interface = error.into_interface("req-1");
        assert!(matches!(
            interface,
            InterfaceError::Internal { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn invariant_violation_maps_to_bad_request() {
        let interface =
            ApplicationError::from(DomainError::InvariantViolation("empty phone".to_owned()))
                .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn persistence_error_is_recoverable_and_unavailable() {
        let error = ApplicationError::Persistence("database is locked".to_owned());
        assert_eq!(error.severity(), ErrorSeverity::Recoverable);

        let interface = error.into_interface("req-3");
        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "El servicio no está disponible por el momento. Intenta de nuevo en unos minutos."
        );
    }

    #[test]
    fn integration_failures_are_best_effort() {
        assert_eq!(
            ApplicationError::Integration("twilio 503".to_owned()).severity(),
            ErrorSeverity::BestEffort
        );
    }

    #[test]
    fn missing_lead_maps_to_not_found() {
        let interface = ApplicationError::from(DomainError::LeadNotFound("abc".to_owned()))
            .into_interface("req-5");
        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.user_message(), "No encontramos el caso solicitado.");
    }
}
