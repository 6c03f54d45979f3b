/// Shape of a remote procedure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Unary,
    ClientStream,
    ServerStream,
    BidiStream,
}

impl StreamType {
    pub fn is_streaming(&self) -> bool {
        !matches!(self, StreamType::Unary)
    }
}

/// Identity of the procedure a call targets.
///
/// `procedure` is the fully-qualified path, e.g.
/// `/api.v1.authentication.Service/Login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    pub procedure: String,
    pub stream_type: StreamType,
}

impl Spec {
    pub fn new(procedure: impl Into<String>, stream_type: StreamType) -> Self {
        Self {
            procedure: procedure.into(),
            stream_type,
        }
    }

    pub fn unary(procedure: impl Into<String>) -> Self {
        Self::new(procedure, StreamType::Unary)
    }

    /// Join a service name and method into a procedure path.
    pub fn procedure_path(service: &str, method: &str) -> String {
        format!("/{}/{}", service, method)
    }
}
