mod name;
mod resolver;
mod zone;

pub use name::{is_error_sentinel, Name, NODATA, NXDOMAIN, SERVFAIL, TIMEOUT};
pub use resolver::{Resolver, ResolverKey, NODATA_SENTINEL};
pub use zone::{Zone, ROOT_ZONE_NAME};
