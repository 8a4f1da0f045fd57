//! Label sanitizing and GKE cluster name rules

use anyhow::{Result, bail};

pub const MAX_GKE_CLUSTER_NAME_LENGTH: usize = 27;

fn is_label_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

/// Lowercase and replace anything outside `[a-z0-9-]` with `-`
pub fn sanitize_label(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if is_label_char(c) { c } else { '-' })
        .collect()
}

/// Append `name=value` to a comma separated label list; empty values add nothing
pub fn add_label(labels: &str, name: &str, value: &str) -> String {
    let value = sanitize_label(value);
    if value.is_empty() {
        return labels.to_string();
    }
    let sep = if labels.is_empty() { "" } else { "," };
    format!("{}{}{}={}", labels, sep, sanitize_label(name), value)
}

pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.len() > MAX_GKE_CLUSTER_NAME_LENGTH {
        bail!(
            "cluster name {} is greater than the maximum {} characters",
            name,
            MAX_GKE_CLUSTER_NAME_LENGTH
        );
    }
    if !name.chars().all(is_label_char) {
        bail!(
            "cluster name {} contains invalid characters. Permitted are lowercase alphanumerics and `-`",
            name
        );
    }
    Ok(())
}
