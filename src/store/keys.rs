//! Deterministic store key naming.
//!
//! These prefixes are a wire-level contract with existing deployments —
//! never rename them.

pub fn service_info(group: &str) -> String {
    format!("sm_service_info_{group}")
}

pub fn service_type_addr_list(group: &str, service_type: i32) -> String {
    format!("sm_service_type_addr_list_{group}_{service_type}")
}

pub fn service_type_level_addr_list(group: &str, service_type: i32) -> String {
    format!("sm_service_type_level_addr_list_{group}_{service_type}")
}

pub fn service_ping(group: &str) -> String {
    format!("sm_service_ping_{group}")
}

pub fn service_info_lock(group: &str, addr: &str) -> String {
    let sanitized: String = addr.chars().map(|c| if c == ':' || c == '.' { '_' } else { c }).collect();
    format!("sm_service_info_lock_{group}_{sanitized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_match_the_deployed_contract() {
        assert_eq!(service_info("g1"), "sm_service_info_g1");
        assert_eq!(service_type_addr_list("g1", 5), "sm_service_type_addr_list_g1_5");
        assert_eq!(service_type_level_addr_list("g1", 5), "sm_service_type_level_addr_list_g1_5");
        assert_eq!(service_ping("g1"), "sm_service_ping_g1");
    }

    #[test]
    fn lock_key_sanitizes_addr_punctuation() {
        assert_eq!(service_info_lock("g1", "10.0.0.1:7000"), "sm_service_info_lock_g1_10_0_0_1_7000");
    }
}
