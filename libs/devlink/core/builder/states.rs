/// Type-state markers for the builder pattern
///
/// These types track at compile time whether an endpoint has been given,
/// so `build()` is only callable once the session knows where to connect.

/// Marker trait for endpoint state
pub trait EndpointState {}

/// No endpoint or config yet
pub struct NoEndpoint;
impl EndpointState for NoEndpoint {}

/// Endpoint known
pub struct HasEndpoint;
impl EndpointState for HasEndpoint {}
