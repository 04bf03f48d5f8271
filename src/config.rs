/// Options of a container
/// ## Fields
/// - `enable_property_injection`:
///   If `true`, settable properties of implementations registered by type are injected after construction.
///
///   Factory expressions only set the properties they initialize explicitly.
/// - `redirect_to_single_named`:
///   If `true`, a request without a name for a service registered under exactly one name
///   resolves that registration.
///
///   This convenience may hide a missing default registration, turn it off to make such requests fail.
#[derive(Debug, Clone, Copy)]
pub struct ContainerOptions {
    pub enable_property_injection: bool,
    pub redirect_to_single_named: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            enable_property_injection: true,
            redirect_to_single_named: true,
        }
    }
}
