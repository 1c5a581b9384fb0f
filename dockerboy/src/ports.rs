use crate::models::PortMapping;

/// Fills a missing side with the present one. A pair with neither side set
/// carries no mapping and is dropped.
pub fn normalize_port(port: PortMapping) -> Option<PortMapping> {
    match (port.host, port.container) {
        (Some(_), Some(_)) => Some(port),
        (Some(host), None) => Some(PortMapping::symmetric(host)),
        (None, Some(container)) => Some(PortMapping::symmetric(container)),
        (None, None) => None,
    }
}

/// Normalizes every entry and drops the empty ones. An empty result means
/// no ports get published.
pub fn normalize_ports<I>(ports: I) -> Vec<PortMapping>
where
    I: IntoIterator<Item = PortMapping>,
{
    ports.into_iter().filter_map(normalize_port).collect()
}

/// `-p` arguments for already normalized mappings, bound to all interfaces.
pub fn publish_args(ports: &[PortMapping]) -> Vec<String> {
    ports
        .iter()
        .filter_map(|port| match (port.host, port.container) {
            (Some(host), Some(container)) => Some(format!("0.0.0.0:{}:{}", host, container)),
            _ => None,
        })
        .flat_map(|publish| vec!["-p".to_owned(), publish])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_pairs_pass_through() {
        let port = PortMapping::new(Some(8080), Some(80));
        assert_eq!(normalize_port(port), Some(port));
    }

    #[test]
    fn one_sided_pairs_become_symmetric() {
        assert_eq!(
            normalize_port(PortMapping::new(Some(6006), None)),
            Some(PortMapping::symmetric(6006))
        );
        assert_eq!(
            normalize_port(PortMapping::new(None, Some(8888))),
            Some(PortMapping::symmetric(8888))
        );
    }

    #[test]
    fn empty_pairs_are_dropped() {
        assert_eq!(normalize_port(PortMapping::default()), None);

        let ports = normalize_ports(vec![
            PortMapping::default(),
            PortMapping::new(None, Some(22)),
            PortMapping::default(),
        ]);
        assert_eq!(ports, vec![PortMapping::symmetric(22)]);
    }

    #[test]
    fn all_degenerate_input_gives_an_empty_list() {
        let ports = normalize_ports(vec![PortMapping::default(), PortMapping::default()]);
        assert!(ports.is_empty());
    }

    #[test]
    fn publish_args_bind_all_interfaces() {
        let args = publish_args(&[
            PortMapping::symmetric(6006),
            PortMapping::new(Some(2222), Some(22)),
        ]);
        assert_eq!(
            args,
            vec!["-p", "0.0.0.0:6006:6006", "-p", "0.0.0.0:2222:22"]
        );
    }
}
