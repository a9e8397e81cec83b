//! Orchestrates FQDN generation, DNS resolution, PCO lookups, and cellular-location lookups
//! into an ordered, filtered, exclusion-aware candidate list.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;

use iwlan_types::address::{sort_by_order, AddressSource, CandidateAddress};
use iwlan_types::{
    AddressFilter, AddressOrder, CarrierConfig, CarrierConfigKey, FailureClass, FeatureFlags,
    IwlanError, Plmn, PlmnSource,
};

use crate::dns::DnsClient;
use crate::exclusion::ExclusionSet;
use crate::fqdn::{cellular_fqdns, plmn_fqdns, plmn_source_walk, GeneratedFqdn};
use crate::network_probe::NetworkProbe;
use crate::pco::PcoStore;
use iwlan_types::CellIdentity;

/// The per-call cellular/SIM context the selector needs but does not itself own; the embedding
/// process (daemon) supplies this from telephony state.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub rplmn: Option<Plmn>,
    pub hplmn: Option<Plmn>,
    pub ehplmns: Vec<Plmn>,
    pub registered_cells: Vec<CellIdentity>,
}

fn parse_priority_list<T: Copy>(
    config: &[i64],
    map: impl Fn(i64) -> Option<T>,
    default: &[T],
) -> Vec<T> {
    if config.is_empty() {
        return default.to_vec();
    }
    config.iter().filter_map(|v| map(*v)).collect()
}

fn plmn_source_from_int(v: i64) -> Option<PlmnSource> {
    match v {
        0 => Some(PlmnSource::Rplmn),
        1 => Some(PlmnSource::Hplmn),
        2 => Some(PlmnSource::EhplmnFirst),
        3 => Some(PlmnSource::EhplmnAll),
        _ => None,
    }
}

fn address_source_from_int(v: i64) -> Option<AddressSource> {
    match v {
        0 => Some(AddressSource::Static),
        1 => Some(AddressSource::Plmn),
        2 => Some(AddressSource::Pco),
        3 => Some(AddressSource::CellularLoc),
        _ => None,
    }
}

/// Object-safe façade over [`EpdgSelector`] so downstream crates (the tunnel manager) can hold
/// one without carrying its `CarrierConfig`/`DnsClient`/`NetworkProbe` type parameters.
#[async_trait]
pub trait Selector: Send + Sync {
    async fn get_validated_server_list(
        &self,
        ctx: &SelectionContext,
        filter: AddressFilter,
        order: AddressOrder,
        is_roaming: bool,
        is_emergency: bool,
    ) -> Result<Vec<IpAddr>, IwlanError>;

    fn on_epdg_connection_failed(&self, addr: IpAddr, class: FailureClass);

    fn on_epdg_connected_successfully(&self);
}

/// Bounded pipeline over FQDNBuilder + DnsClient + PcoStore + ExclusionSet, with a two-slot
/// execution pool: one reserved for speculative prefetch, one for an actual setup resolution.
pub struct EpdgSelector<C, D, N> {
    carrier_config: Arc<C>,
    dns: Arc<D>,
    network_probe: Arc<N>,
    pco: PcoStore,
    exclusion: ExclusionSet,
    setup_slot: Semaphore,
    prefetch_slot: Semaphore,
    features: FeatureFlags,
}

impl<C, D, N> EpdgSelector<C, D, N>
where
    C: CarrierConfig,
    D: DnsClient,
    N: NetworkProbe,
{
    pub fn new(carrier_config: Arc<C>, dns: Arc<D>, network_probe: Arc<N>) -> Self {
        Self::with_features(carrier_config, dns, network_probe, FeatureFlags::default())
    }

    pub fn with_features(
        carrier_config: Arc<C>,
        dns: Arc<D>,
        network_probe: Arc<N>,
        features: FeatureFlags,
    ) -> Self {
        Self {
            carrier_config,
            dns,
            network_probe,
            pco: PcoStore::new(),
            exclusion: ExclusionSet::new(),
            setup_slot: Semaphore::new(1),
            prefetch_slot: Semaphore::new(1),
            features,
        }
    }

    pub fn pco_store(&self) -> &PcoStore {
        &self.pco
    }

    pub fn exclusion_set(&self) -> &ExclusionSet {
        &self.exclusion
    }

    /// Runs one resolution on the bounded setup slot. With `preventExhaustion` off, a second
    /// setup request issued while one is already in flight is rejected immediately with a
    /// scheduling error rather than queued; with it on, the request waits and is effectively
    /// coalesced onto the in-flight resolution's slot.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_validated_server_list(
        &self,
        ctx: &SelectionContext,
        filter: AddressFilter,
        order: AddressOrder,
        is_roaming: bool,
        is_emergency: bool,
    ) -> Result<Vec<IpAddr>, IwlanError> {
        let _permit = if self.features.prevent_exhaustion {
            self.setup_slot
                .acquire()
                .await
                .map_err(|_| IwlanError::EpdgSelectorServerSelectionFailed)?
        } else {
            self.setup_slot
                .try_acquire()
                .map_err(|_| IwlanError::EpdgSelectorServerSelectionFailed)?
        };
        self.resolve(ctx, filter, order, is_roaming, is_emergency).await
    }

    /// Speculative resolution on the separate prefetch slot; does not block behind an
    /// in-flight setup resolution.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn prefetch_validated_server_list(
        &self,
        ctx: &SelectionContext,
        filter: AddressFilter,
        order: AddressOrder,
        is_roaming: bool,
        is_emergency: bool,
    ) -> Result<Vec<IpAddr>, IwlanError> {
        let _permit = self
            .prefetch_slot
            .acquire()
            .await
            .map_err(|_| IwlanError::EpdgSelectorServerSelectionFailed)?;
        self.resolve(ctx, filter, order, is_roaming, is_emergency).await
    }

    async fn resolve(
        &self,
        ctx: &SelectionContext,
        filter: AddressFilter,
        order: AddressOrder,
        is_roaming: bool,
        is_emergency: bool,
    ) -> Result<Vec<IpAddr>, IwlanError> {
        let source_order = parse_priority_list(
            &self
                .carrier_config
                .get_int_array(CarrierConfigKey::EpdgAddressPriority)
                .unwrap_or_default(),
            address_source_from_int,
            &[
                AddressSource::Static,
                AddressSource::Plmn,
                AddressSource::Pco,
                AddressSource::CellularLoc,
            ],
        );

        let mut dns_cache: HashMap<String, Vec<IpAddr>> = HashMap::new();
        let mut concatenated = Vec::new();

        for source in &source_order {
            let batch = match source {
                AddressSource::Static => {
                    self.resolve_static(is_roaming, &mut dns_cache).await
                }
                AddressSource::Plmn => {
                    self.resolve_plmn(ctx, is_emergency, &mut dns_cache).await
                }
                AddressSource::Pco => self.resolve_pco(),
                AddressSource::CellularLoc => {
                    self.resolve_cellular(ctx, is_emergency, &mut dns_cache).await
                }
            };
            concatenated.extend(batch);
        }

        let deduped = dedup_preserving_order(concatenated);
        let filtered = self.apply_family_filter(deduped, filter)?;
        let excluded = self.exclusion.apply(filtered);

        let mut addrs = excluded;
        sort_by_order(&mut addrs, order);
        Ok(addrs.into_iter().map(|c| c.addr).collect())
    }

    async fn resolve_static(
        &self,
        is_roaming: bool,
        cache: &mut HashMap<String, Vec<IpAddr>>,
    ) -> Vec<CandidateAddress> {
        let key = if is_roaming {
            CarrierConfigKey::EpdgStaticAddressRoaming
        } else {
            CarrierConfigKey::EpdgStaticAddress
        };
        let Some(raw) = self.carrier_config.get_string(key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Ok(ip) = entry.parse::<IpAddr>() {
                out.push(CandidateAddress::new(ip, AddressSource::Static));
            } else {
                for ip in self.resolve_cached(entry, cache).await {
                    out.push(CandidateAddress::new(ip, AddressSource::Static));
                }
            }
        }
        out
    }

    async fn resolve_plmn(
        &self,
        ctx: &SelectionContext,
        is_emergency: bool,
        cache: &mut HashMap<String, Vec<IpAddr>>,
    ) -> Vec<CandidateAddress> {
        let order = parse_priority_list(
            &self
                .carrier_config
                .get_int_array(CarrierConfigKey::EpdgPlmnPriority)
                .unwrap_or_default(),
            plmn_source_from_int,
            &[PlmnSource::Rplmn, PlmnSource::Hplmn, PlmnSource::EhplmnAll],
        );
        let allow_list = self.carrier_config.get_string_array(CarrierConfigKey::MccMncs);

        let plmns = plmn_source_walk(
            &order,
            ctx.rplmn.as_ref(),
            ctx.hplmn.as_ref(),
            &ctx.ehplmns,
            allow_list.as_deref(),
        );

        let mut fqdns = Vec::new();
        for plmn in &plmns {
            fqdns.extend(plmn_fqdns(plmn, is_emergency));
        }

        self.resolve_fqdns(fqdns, AddressSource::Plmn, cache).await
    }

    fn resolve_pco(&self) -> Vec<CandidateAddress> {
        let mut out = Vec::new();
        if let Some(id) = self.carrier_config.get_int(CarrierConfigKey::EpdgPcoIdIpv4) {
            if let Some(addr) = self.pco.ipv4_address(id as u16) {
                out.push(CandidateAddress::new(IpAddr::V4(addr), AddressSource::Pco));
            }
        }
        if let Some(id) = self.carrier_config.get_int(CarrierConfigKey::EpdgPcoIdIpv6) {
            if let Some(addr) = self.pco.ipv6_address(id as u16) {
                out.push(CandidateAddress::new(IpAddr::V6(addr), AddressSource::Pco));
            }
        }
        out
    }

    async fn resolve_cellular(
        &self,
        ctx: &SelectionContext,
        is_emergency: bool,
        cache: &mut HashMap<String, Vec<IpAddr>>,
    ) -> Vec<CandidateAddress> {
        let mut fqdns = Vec::new();
        for cell in &ctx.registered_cells {
            fqdns.extend(cellular_fqdns(cell, is_emergency));
        }
        self.resolve_fqdns(fqdns, AddressSource::CellularLoc, cache).await
    }

    /// Resolves `fqdns` concurrently but re-sequences the results back into the original,
    /// priority-ordered sequence before returning them.
    async fn resolve_fqdns(
        &self,
        fqdns: Vec<GeneratedFqdn>,
        source: AddressSource,
        cache: &mut HashMap<String, Vec<IpAddr>>,
    ) -> Vec<CandidateAddress> {
        let uncached: Vec<&GeneratedFqdn> =
            fqdns.iter().filter(|f| !cache.contains_key(&f.name)).collect();
        let names: Vec<String> = uncached.iter().map(|f| f.name.clone()).collect();
        let results = join_all(names.iter().map(|name| self.dns.resolve(name))).await;
        for (name, result) in names.into_iter().zip(results) {
            cache.insert(name, result.unwrap_or_default());
        }

        let mut out = Vec::new();
        for f in &fqdns {
            if let Some(addrs) = cache.get(&f.name) {
                out.extend(addrs.iter().map(|a| CandidateAddress::new(*a, source)));
            }
        }
        out
    }

    async fn resolve_cached(
        &self,
        hostname: &str,
        cache: &mut HashMap<String, Vec<IpAddr>>,
    ) -> Vec<IpAddr> {
        if let Some(addrs) = cache.get(hostname) {
            return addrs.clone();
        }
        let addrs = self.dns.resolve(hostname).await.unwrap_or_default();
        cache.insert(hostname.to_string(), addrs.clone());
        addrs
    }

    fn apply_family_filter(
        &self,
        candidates: Vec<CandidateAddress>,
        filter: AddressFilter,
    ) -> Result<Vec<CandidateAddress>, IwlanError> {
        if matches!(filter, AddressFilter::Ipv6Only) && !self.network_probe.has_ipv6() {
            return Err(IwlanError::EpdgAddressOnlyIpv6Allowed);
        }
        if matches!(filter, AddressFilter::Ipv4Only) && !self.network_probe.has_ipv4() {
            return Err(IwlanError::EpdgAddressOnlyIpv4Allowed);
        }
        Ok(candidates.into_iter().filter(|c| filter.allows(c.addr)).collect())
    }

    pub fn on_epdg_connection_failed(&self, addr: IpAddr, class: FailureClass) {
        self.exclusion.on_connection_failed(addr, class);
    }

    pub fn on_epdg_connected_successfully(&self) {
        self.exclusion.on_connected_successfully();
    }
}

#[async_trait]
impl<C, D, N> Selector for EpdgSelector<C, D, N>
where
    C: CarrierConfig + 'static,
    D: DnsClient + 'static,
    N: NetworkProbe + 'static,
{
    async fn get_validated_server_list(
        &self,
        ctx: &SelectionContext,
        filter: AddressFilter,
        order: AddressOrder,
        is_roaming: bool,
        is_emergency: bool,
    ) -> Result<Vec<IpAddr>, IwlanError> {
        EpdgSelector::get_validated_server_list(self, ctx, filter, order, is_roaming, is_emergency)
            .await
    }

    fn on_epdg_connection_failed(&self, addr: IpAddr, class: FailureClass) {
        EpdgSelector::on_epdg_connection_failed(self, addr, class);
    }

    fn on_epdg_connected_successfully(&self) {
        EpdgSelector::on_epdg_connected_successfully(self);
    }
}

fn dedup_preserving_order(candidates: Vec<CandidateAddress>) -> Vec<CandidateAddress> {
    let mut seen = HashSet::new();
    candidates.into_iter().filter(|c| seen.insert(c.addr)).collect()
}
