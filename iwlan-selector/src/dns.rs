//! DNS resolution abstraction. Resolution is behind a trait so the selector can be driven by
//! an in-memory fake in tests and by a real stub resolver in production.

use std::net::IpAddr;

use async_trait::async_trait;
use domain::base::Rtype;
use domain::resolv::StubResolver;

/// Resolves one hostname to its addresses, or reports that the lookup timed out / failed.
#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("DNS lookup timed out")]
    Timeout,
    #[error("DNS lookup failed: {0}")]
    Failed(String),
}

/// Production [`DnsClient`] backed by `domain`'s asynchronous stub resolver, looking up both
/// `A` and `AAAA` records.
pub struct StubResolverDnsClient {
    resolver: StubResolver,
}

impl StubResolverDnsClient {
    pub fn new() -> Self {
        Self { resolver: StubResolver::new() }
    }
}

impl Default for StubResolverDnsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsClient for StubResolverDnsClient {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        let name: domain::base::Name<Vec<u8>> = hostname
            .parse()
            .map_err(|e| DnsError::Failed(format!("invalid hostname {hostname}: {e}")))?;

        let mut out = Vec::new();
        for rtype in [Rtype::A, Rtype::AAAA] {
            match self.resolver.query((&name, rtype)).await {
                Ok(answer) => {
                    if let Ok(records) = answer.answer() {
                        for record in records.limit_to::<domain::rdata::AllRecordData<_, _>>() {
                            let Ok(record) = record else { continue };
                            match record.data() {
                                domain::rdata::AllRecordData::A(a) => {
                                    out.push(IpAddr::V4(a.addr()));
                                }
                                domain::rdata::AllRecordData::Aaaa(aaaa) => {
                                    out.push(IpAddr::V6(aaaa.addr()));
                                }
                                _ => {}
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(%hostname, ?rtype, error = %e, "DNS query failed");
                }
            }
        }
        Ok(out)
    }
}
