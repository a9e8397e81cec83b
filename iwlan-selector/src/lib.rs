//! ePDG address resolution: FQDN generation, DNS resolution, PCO-derived addresses,
//! cellular-location lookups, family filtering, ordering, and the temporary exclusion memory.

pub mod dns;
pub mod exclusion;
pub mod fqdn;
pub mod network_probe;
pub mod pco;
pub mod selector;

pub use dns::{DnsClient, DnsError};
pub use exclusion::ExclusionSet;
pub use network_probe::NetworkProbe;
pub use pco::{ApnType, PcoStore};
pub use selector::{EpdgSelector, SelectionContext, Selector};
