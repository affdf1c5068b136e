/// Integration tests for planning-center-client
///
/// Every test runs against a local wiremock server standing in for the
/// Planning Center API.
mod api;
