// Library interface for the DDNS gateway
// Allows integration testing of update processing

pub mod dns;
