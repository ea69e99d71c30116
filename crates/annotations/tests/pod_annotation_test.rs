//! Integration tests for the pod-networks annotation
//!
//! These exercise the public API the way the cluster-level writer and the
//! per-host reader use it: encode into metadata, decode back.

use std::collections::BTreeMap;

use annotations::{
    decode, decode_network, encode, encode_network, AnnotationError, PodAnnotation, PodRoute,
    POD_NETWORKS_ANNOTATION,
};

fn metadata(value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(POD_NETWORKS_ANNOTATION.to_string(), value.to_string())])
}

fn dual_stack() -> PodAnnotation {
    PodAnnotation {
        ips: vec![
            "192.168.0.5/24".parse().unwrap(),
            "fd00:10:244::5/64".parse().unwrap(),
        ],
        mac: "0a:58:fd:98:00:01".parse().unwrap(),
        gateways: vec!["192.168.0.1".parse().unwrap(), "fd00:10:244::1".parse().unwrap()],
        routes: vec![
            PodRoute {
                dest: "192.168.1.0/24".parse().unwrap(),
                next_hop: Some("192.168.1.1".parse().unwrap()),
            },
            PodRoute {
                dest: "fd00:10:96::/112".parse().unwrap(),
                next_hop: None,
            },
        ],
    }
}

#[test]
fn test_round_trip_dual_stack_with_routes() {
    let pod = dual_stack();
    let encoded = encode(&pod).expect("encode");
    assert_eq!(encoded.len(), 1);
    assert_eq!(decode(&encoded).expect("decode"), pod);
}

#[test]
fn test_round_trip_named_network() {
    let pod = dual_stack();
    let encoded = encode_network("tenant-blue", &pod).expect("encode");
    assert!(encoded[POD_NETWORKS_ANNOTATION].starts_with(r#"{"tenant-blue":"#));
    assert_eq!(decode_network(&encoded, "tenant-blue").expect("decode"), pod);
}

#[test]
fn test_round_trip_route_dest_with_host_bits() {
    // Setup: a route whose destination carries host bits
    let mut pod = dual_stack();
    pod.routes = vec![PodRoute {
        dest: "10.96.3.4/16".parse().unwrap(),
        next_hop: None,
    }];

    // Execute
    let encoded = encode(&pod).expect("encode");
    let decoded = decode(&encoded).expect("decode");

    // Assert: the network is written, and it reads back as written
    assert!(encoded[POD_NETWORKS_ANNOTATION].contains(r#""routes":[{"dest":"10.96.0.0/16","nextHop":""}]"#));
    assert_eq!(decoded.routes[0].dest.to_string(), "10.96.0.0/16");
    assert_eq!(encode(&decoded).expect("re-encode"), encoded);
    assert_eq!(decode(&encode(&decoded).expect("re-encode")).expect("decode"), decoded);
}

#[test]
fn test_route_with_host_bits_inside_default_network_is_rejected() {
    let mut pod = dual_stack();
    pod.routes = vec![PodRoute {
        dest: "10.0.0.1/0".parse().unwrap(),
        next_hop: None,
    }];

    let err = encode(&pod).unwrap_err();
    assert!(err.to_string().contains("should be specified as gateway"), "{err}");
}

#[test]
fn test_single_ip_legacy_forms_decode_identically() {
    let plural_only = metadata(
        r#"{"default":{"ip_addresses":["192.168.0.5/24"],"mac_address":"0a:58:fd:98:00:01","gateway_ips":["192.168.0.1"]}}"#,
    );
    let singular_only = metadata(
        r#"{"default":{"ip_address":"192.168.0.5/24","mac_address":"0a:58:fd:98:00:01","gateway_ip":"192.168.0.1"}}"#,
    );
    let both = metadata(
        r#"{"default":{"ip_addresses":["192.168.0.5/24"],"mac_address":"0a:58:fd:98:00:01","gateway_ips":["192.168.0.1"],"ip_address":"192.168.0.5/24","gateway_ip":"192.168.0.1"}}"#,
    );

    let expected = PodAnnotation {
        ips: vec!["192.168.0.5/24".parse().unwrap()],
        mac: "0a:58:fd:98:00:01".parse().unwrap(),
        gateways: vec!["192.168.0.1".parse().unwrap()],
        routes: vec![],
    };

    assert_eq!(decode(&plural_only).unwrap(), expected);
    assert_eq!(decode(&singular_only).unwrap(), expected);
    assert_eq!(decode(&both).unwrap(), expected);

    // The writer always emits both forms for a single address
    assert_eq!(encode(&expected).unwrap(), both);
}

#[test]
fn test_ip_conflict_is_rejected() {
    let value = metadata(
        r#"{"default":{"ip_addresses":["192.168.0.5/24"],"ip_address":"192.168.0.6/24","mac_address":"0a:58:fd:98:00:01"}}"#,
    );
    match decode(&value) {
        Err(AnnotationError::InvalidConfig(msg)) => {
            assert!(msg.contains("ip_address and ip_addresses conflict"), "{msg}")
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn test_default_route_must_be_a_gateway() {
    let mut pod = dual_stack();
    pod.routes = vec![PodRoute {
        dest: "0.0.0.0/0".parse().unwrap(),
        next_hop: Some("192.168.0.1".parse().unwrap()),
    }];
    let err = encode(&pod).unwrap_err();
    assert!(err.to_string().contains("should be specified as gateway"));

    let value = metadata(
        r#"{"default":{"ip_addresses":["192.168.0.5/24"],"mac_address":"0a:58:fd:98:00:01","routes":[{"dest":"::/0","nextHop":"fd00::1"}]}}"#,
    );
    assert!(matches!(decode(&value), Err(AnnotationError::InvalidConfig(_))));

    // The gateway form of the same intent is accepted
    pod.routes.clear();
    assert!(encode(&pod).is_ok());
}

#[test]
fn test_next_hop_family_must_match_on_encode() {
    let mut pod = dual_stack();
    pod.routes = vec![PodRoute {
        dest: "10.96.0.0/16".parse().unwrap(),
        next_hop: Some("fd00:10:244::1".parse().unwrap()),
    }];
    assert!(matches!(encode(&pod), Err(AnnotationError::InvalidConfig(_))));
}

#[test]
fn test_unknown_fields_are_ignored() {
    let value = metadata(
        r#"{"default":{"ip_addresses":["192.168.0.5/24"],"mac_address":"0a:58:fd:98:00:01","role":"primary","tunnel_id":7}}"#,
    );
    let pod = decode(&value).unwrap();
    assert_eq!(pod.ips.len(), 1);
}

#[test]
fn test_bad_mac_is_rejected() {
    let value = metadata(r#"{"default":{"ip_addresses":["192.168.0.5/24"],"mac_address":"zz:58:fd:98:00:01"}}"#);
    assert!(matches!(decode(&value), Err(AnnotationError::InvalidConfig(_))));
}
