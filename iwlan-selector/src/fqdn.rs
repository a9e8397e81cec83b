//! Pure FQDN construction from PLMNs and cellular cell identities. No I/O, no state.

use std::collections::HashSet;

use iwlan_types::{CellIdentity, Plmn, PlmnSource};

/// One generated FQDN, tagged with whether it is the emergency (`sos.`) variant. The tag lets
/// callers interleave sos/non-sos variants per the emergency-ordering rule without re-parsing
/// the string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFqdn {
    pub name: String,
    pub is_sos: bool,
}

fn insert_sos(name: &str) -> String {
    name.replacen("epdg.", "sos.epdg.", 1)
}

/// Builds the PLMN-style FQDN(s) for `plmn`. When `emergency` is true, returns the sos variant
/// followed by the non-sos variant (sos ordered first within the pair); otherwise only the
/// non-sos variant.
pub fn plmn_fqdns(plmn: &Plmn, emergency: bool) -> Vec<GeneratedFqdn> {
    let base = format!(
        "epdg.epc.mnc{}.mcc{}.pub.3gppnetwork.org",
        plmn.mnc_padded(),
        plmn.mcc()
    );
    if emergency {
        vec![
            GeneratedFqdn { name: insert_sos(&base), is_sos: true },
            GeneratedFqdn { name: base, is_sos: false },
        ]
    } else {
        vec![GeneratedFqdn { name: base, is_sos: false }]
    }
}

/// Builds the cellular-location FQDN(s) for one registered cell.
pub fn cellular_fqdns(cell: &CellIdentity, emergency: bool) -> Vec<GeneratedFqdn> {
    let plmn = cell.plmn();
    let suffix = format!("epdg.epc.mnc{}.mcc{}.pub.3gppnetwork.org", plmn.mnc_padded(), plmn.mcc());
    let base = match cell {
        CellIdentity::GsmOrWcdma { lac, .. } => format!("lac{lac:04x}.{suffix}"),
        CellIdentity::Lte { tac, .. } => {
            let low = tac & 0xFF;
            let high = (tac >> 8) & 0xFF;
            format!("tac-lb{low:02x}.tac-hb{high:02x}.tac.{suffix}")
        }
        CellIdentity::Nr { tac, .. } => {
            let b0 = tac & 0xFF;
            let b1 = (tac >> 8) & 0xFF;
            let b2 = (tac >> 16) & 0xFF;
            format!("tac-lb{b0:02x}.tac-mb{b1:02x}.tac-hb{b2:02x}.5gstac.{suffix}")
        }
    };
    if emergency {
        vec![
            GeneratedFqdn { name: insert_sos(&base), is_sos: true },
            GeneratedFqdn { name: base, is_sos: false },
        ]
    } else {
        vec![GeneratedFqdn { name: base, is_sos: false }]
    }
}

fn mcc_mnc_allowed(plmn: &Plmn, allow_list: Option<&[String]>) -> bool {
    match allow_list {
        Some(list) => list.iter().any(|e| e == &plmn.mcc_mnc()),
        None => true,
    }
}

/// Walks the carrier-configured PLMN source priority order, emitting each valid, not-yet-seen
/// PLMN. `rplmn` is always included when its source appears in `order`, regardless of the
/// allow-list; `hplmn` and the EHPLMN sources are subject to `allow_list` when present.
pub fn plmn_source_walk(
    order: &[PlmnSource],
    rplmn: Option<&Plmn>,
    hplmn: Option<&Plmn>,
    ehplmns: &[Plmn],
    allow_list: Option<&[String]>,
) -> Vec<Plmn> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |plmn: &Plmn, out: &mut Vec<Plmn>| {
        if seen.insert(plmn.clone()) {
            out.push(plmn.clone());
        }
    };
    for source in order {
        match source {
            PlmnSource::Rplmn => {
                if let Some(p) = rplmn {
                    push(p, &mut out);
                }
            }
            PlmnSource::Hplmn => {
                if let Some(p) = hplmn {
                    if mcc_mnc_allowed(p, allow_list) {
                        push(p, &mut out);
                    }
                }
            }
            PlmnSource::EhplmnFirst => {
                if let Some(p) = ehplmns.first() {
                    if mcc_mnc_allowed(p, allow_list) {
                        push(p, &mut out);
                    }
                }
            }
            PlmnSource::EhplmnAll => {
                for p in ehplmns {
                    if mcc_mnc_allowed(p, allow_list) {
                        push(p, &mut out);
                    }
                }
            }
        }
    }
    out
}
