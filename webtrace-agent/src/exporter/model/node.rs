use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProcessIdentifier {
    host_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct ServiceInfo {
    name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LibraryInfo {
    exporter_version: String,
}

/// Describes the process sending spans; sent with every request.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Node {
    #[builder(setter(transform = |host_name: String| ProcessIdentifier { host_name }))]
    identifier: ProcessIdentifier,
    #[builder(setter(transform = |name: String| ServiceInfo { name }))]
    service_info: ServiceInfo,
    #[builder(
        default = LibraryInfo { exporter_version: env!("CARGO_PKG_VERSION").to_string() },
        setter(skip)
    )]
    library_info: LibraryInfo,
    #[builder(default)]
    attributes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_json() {
        let node = Node::builder()
            .identifier("shop.example".to_string())
            .service_info("testService".to_string())
            .attributes(BTreeMap::from([(
                "serviceAddr1".to_string(),
                "a".to_string(),
            )]))
            .build();

        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "identifier": {"hostName": "shop.example"},
                "serviceInfo": {"name": "testService"},
                "libraryInfo": {"exporterVersion": env!("CARGO_PKG_VERSION")},
                "attributes": {"serviceAddr1": "a"}
            })
        );
    }
}
