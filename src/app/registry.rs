//! Handler registry: which content handlers exist and which service types
//! each of them can present.
//!
//! The registry is the [`HandlerSelector`] a view consults whenever a
//! history entry (or a caller) asks for a different service type than the
//! active handler supports.

use super::handler::{ContentHandler, HandlerError, HandlerSelector};
use url::Url;

type HandlerFactory = Box<dyn Fn() -> Result<Box<dyn ContentHandler>, HandlerError>>;

struct Registration {
    service_name: String,
    service_types: Vec<String>,
    factory: HandlerFactory,
}

/// Known content handlers, in preference order.
pub struct HandlerRegistry {
    registrations: Vec<Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register a handler factory. Earlier registrations win when several
    /// handlers support the same service type.
    pub fn register<F>(&mut self, service_name: &str, service_types: &[&str], factory: F)
    where
        F: Fn() -> Result<Box<dyn ContentHandler>, HandlerError> + 'static,
    {
        self.registrations.push(Registration {
            service_name: service_name.to_string(),
            service_types: service_types.iter().map(|t| t.to_string()).collect(),
            factory: Box::new(factory),
        });
    }

    /// Names of the handlers supporting `service_type`, in preference order.
    pub fn offers(&self, service_type: &str) -> Vec<&str> {
        self.registrations
            .iter()
            .filter(|r| r.supports(service_type))
            .map(|r| r.service_name.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl Registration {
    fn supports(&self, service_type: &str) -> bool {
        self.service_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(service_type))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerSelector for HandlerRegistry {
    fn select_handler(
        &mut self,
        service_type: &str,
        service_name: &str,
        url: Option<&Url>,
    ) -> Option<Box<dyn ContentHandler>> {
        let registration = self.registrations.iter().find(|r| {
            r.supports(service_type) && (service_name.is_empty() || r.service_name == service_name)
        });

        match registration {
            Some(r) => {
                log::debug!(
                    "Selected {} for {} ({})",
                    r.service_name,
                    service_type,
                    url.map(Url::as_str).unwrap_or("no url")
                );
                match (r.factory)() {
                    Ok(handler) => Some(handler),
                    Err(e) => {
                        log::warn!("Could not create {}: {}", r.service_name, e);
                        None
                    }
                }
            }
            None => {
                log::warn!("No handler offers {} (service {:?})", service_type, service_name);
                None
            }
        }
    }
}
