//! gNMI path construction and rendering

use crate::gnmi::{Path, PathElem};

/// Build a path holding the whole expression as a single element.
///
/// The expression is not split, trimmed or escaped: a keyed OpenConfig path
/// such as `/openconfig-interfaces:interfaces/interface[name=Ethernet0]/config`
/// becomes one `PathElem` with that exact name and no keys.
pub fn build_path(expression: &str) -> Path {
    Path {
        elem: vec![PathElem {
            name: expression.to_string(),
            key: Default::default(),
        }],
        ..Default::default()
    }
}

/// Render a path as `elem/elem[key=value]`, with keys in sorted order.
pub fn path_to_string(path: &Path) -> String {
    path.elem
        .iter()
        .map(|elem| {
            if elem.key.is_empty() {
                elem.name.clone()
            } else {
                let mut keys: Vec<String> = elem
                    .key
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                keys.sort();
                format!("{}[{}]", elem.name, keys.join(","))
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
