// Linux-specific helpers: interface link speed and virtual interface detection.

/// Read network interface link speed from /sys/class/net/<interface>/speed (Linux).
/// Returns speed in bits per second, or 0 if unavailable.
pub(super) fn get_interface_speed(interface_name: &str) -> u64 {
    #[cfg(target_os = "linux")]
    {
        let path = format!("/sys/class/net/{}/speed", interface_name);
        if let Ok(content) = std::fs::read_to_string(&path)
            && let Ok(mbps) = content.trim().parse::<i64>()
            && mbps > 0
        {
            return (mbps as u64) * 1_000_000;
        }
    }
    0
}

/// Loopback, docker bridges and veth pairs double-count container traffic.
pub(super) fn is_virtual_interface(name: &str) -> bool {
    name == "lo"
        || name.starts_with("veth")
        || name.starts_with("docker")
        || name.starts_with("br-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_interfaces_are_skipped() {
        assert!(is_virtual_interface("lo"));
        assert!(is_virtual_interface("veth12ab"));
        assert!(is_virtual_interface("docker0"));
        assert!(is_virtual_interface("br-3f2a"));
        assert!(!is_virtual_interface("eth0"));
        assert!(!is_virtual_interface("enp3s0"));
    }

    #[test]
    fn missing_interface_has_no_speed() {
        assert_eq!(get_interface_speed("definitely-not-an-iface"), 0);
    }
}
