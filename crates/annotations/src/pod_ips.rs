//! Pod address lookup.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use k8s_openapi::api::core::v1::Pod;
use tracing::warn;

use crate::error::AnnotationError;
use crate::pod_networks;

/// Returns every address of the pod's primary interface.
///
/// The pod-networks annotation wins when it decodes; otherwise the addresses
/// reported in `status.podIPs` are used, then the legacy `status.podIP`.
/// Status entries that do not parse are skipped.
pub fn get_all_pod_ips(pod: &Pod) -> Result<Vec<IpAddr>, AnnotationError> {
    let empty = BTreeMap::new();
    let annotations = pod.metadata.annotations.as_ref().unwrap_or(&empty);

    match pod_networks::decode(annotations) {
        Ok(annotation) => {
            return Ok(annotation.ips.iter().map(IpNet::addr).collect());
        }
        Err(e) if e.is_not_present() => {}
        Err(e) => {
            warn!("Ignoring unusable pod-networks annotation on {}: {}", pod_key(pod), e);
        }
    }

    let mut ips = Vec::new();
    if let Some(status) = &pod.status {
        for pod_ip in status.pod_ips.iter().flatten() {
            match pod_ip.ip.parse::<IpAddr>() {
                Ok(ip) => ips.push(ip),
                Err(_) => warn!("Skipping unparseable pod IP {:?} on {}", pod_ip.ip, pod_key(pod)),
            }
        }
        if ips.is_empty() {
            if let Some(ip) = status.pod_ip.as_deref().and_then(|ip| ip.parse::<IpAddr>().ok()) {
                ips.push(ip);
            }
        }
    }

    if ips.is_empty() {
        return Err(AnnotationError::NoPodIpFound {
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            name: pod.metadata.name.clone().unwrap_or_default(),
        });
    }
    Ok(ips)
}

/// Returns the pod's addresses as host routes (/32 or /128).
pub fn get_pod_cidrs_with_full_mask(pod: &Pod) -> Result<Vec<IpNet>, AnnotationError> {
    Ok(get_all_pod_ips(pod)?.into_iter().map(IpNet::from).collect())
}

fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pod_networks::POD_NETWORKS_ANNOTATION;

    fn pod(annotation: Option<&str>, pod_ips: &[&str], pod_ip: Option<&str>) -> Pod {
        let mut value = json!({
            "metadata": {"name": "web", "namespace": "default"},
            "status": {},
        });
        if let Some(annotation) = annotation {
            value["metadata"]["annotations"] = json!({ POD_NETWORKS_ANNOTATION: annotation });
        }
        if !pod_ips.is_empty() {
            let ips: Vec<_> = pod_ips.iter().map(|ip| json!({ "ip": ip })).collect();
            value["status"]["podIPs"] = json!(ips);
        }
        if let Some(ip) = pod_ip {
            value["status"]["podIP"] = json!(ip);
        }
        serde_json::from_value(value).unwrap()
    }

    const ANNOTATION: &str =
        r#"{"default":{"ip_addresses":["10.244.1.5/24","fd00:10:244:1::5/64"],"mac_address":"0a:58:0a:f4:01:05"}}"#;

    #[test]
    fn test_annotation_takes_priority() {
        let pod = pod(Some(ANNOTATION), &["10.0.0.9"], Some("10.0.0.9"));
        let ips = get_all_pod_ips(&pod).unwrap();
        assert_eq!(
            ips,
            vec!["10.244.1.5".parse::<IpAddr>().unwrap(), "fd00:10:244:1::5".parse().unwrap()]
        );
    }

    #[test]
    fn test_falls_back_to_status_pod_ips() {
        let pod = pod(None, &["10.0.0.9", "bogus", "fd00::9"], Some("10.0.0.1"));
        let ips = get_all_pod_ips(&pod).unwrap();
        assert_eq!(ips, vec!["10.0.0.9".parse::<IpAddr>().unwrap(), "fd00::9".parse().unwrap()]);
    }

    #[test]
    fn test_falls_back_to_legacy_pod_ip() {
        let pod = pod(Some("garbage"), &[], Some("10.0.0.1"));
        let cidrs = get_pod_cidrs_with_full_mask(&pod).unwrap();
        assert_eq!(cidrs, vec!["10.0.0.1/32".parse::<IpNet>().unwrap()]);
    }

    #[test]
    fn test_no_ips_found() {
        let err = get_all_pod_ips(&pod(None, &[], None)).unwrap_err();
        assert_eq!(err.to_string(), "pod default/web: no pod IPs found");
    }

    #[test]
    fn test_full_mask_for_ipv6() {
        let cidrs = get_pod_cidrs_with_full_mask(&pod(Some(ANNOTATION), &[], None)).unwrap();
        assert_eq!(cidrs[1], "fd00:10:244:1::5/128".parse::<IpNet>().unwrap());
    }
}
