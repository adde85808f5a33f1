//! Numeric replies consumed during registration and SASL.

/// Registration complete. Seen mid-negotiation it means no `CAP` support.
pub const RPL_WELCOME: &str = "001";
/// Logged in to an account.
pub const RPL_LOGGEDIN: &str = "900";
/// The account is held by another nick.
pub const ERR_NICKLOCKED: &str = "902";
/// SASL authentication succeeded.
pub const RPL_SASLSUCCESS: &str = "903";
/// SASL authentication failed.
pub const ERR_SASLFAIL: &str = "904";
/// An `AUTHENTICATE` payload was too long.
pub const ERR_SASLTOOLONG: &str = "905";
/// SASL authentication aborted.
pub const ERR_SASLABORTED: &str = "906";
/// Mechanisms the server supports.
pub const RPL_SASLMECHS: &str = "908";

/// Every numeric that ends a SASL exchange.
pub const SASL_OUTCOMES: &[&str] = &[
    RPL_SASLSUCCESS,
    ERR_SASLFAIL,
    ERR_NICKLOCKED,
    ERR_SASLTOOLONG,
    ERR_SASLABORTED,
];
