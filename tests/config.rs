use mesh_partition::algs::distribute::CollectOptions;
use mesh_partition::algs::pipeline::DistributionConfig;
use mesh_partition::data::{ConnectivityFormat, IndexBase};
use mesh_partition::partitioning::{GatheredPartitioner, PartitionParams};

#[test]
fn full_config_from_json() {
    let c: DistributionConfig = serde_json::from_str(
        r#"{
            "root": 2,
            "ndim": 2,
            "element_format": { "leading_columns": 0, "base": "zero" },
            "face_format": { "leading_columns": 1, "base": "one" },
            "adaptive": false,
            "params": {
                "nparts": 4,
                "ncommon_nodes": 2,
                "imbalance_tolerance": 1.1,
                "target_weights": [0.25, 0.25, 0.25, 0.25]
            }
        }"#,
    )
    .unwrap();
    assert_eq!(c.root, 2);
    assert_eq!(c.element_format, ConnectivityFormat::plain());
    assert_eq!(c.face_format.base, IndexBase::One);
    assert_eq!(c.params.nparts_for(8), 4);
    assert_eq!(c.params.redistribution_cost, PartitionParams::default().redistribution_cost);
    assert_eq!(
        c.collect_options(),
        CollectOptions {
            root: 2,
            ndim: 2,
            format: ConnectivityFormat::plain(),
        }
    );
}

#[test]
fn empty_config_is_default() {
    let c: DistributionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(c, DistributionConfig::default());
    let p: GatheredPartitioner = serde_json::from_str(r#"{"root": 3}"#).unwrap();
    assert_eq!(p, GatheredPartitioner::new(3));
}

#[test]
fn config_round_trips_through_json() {
    let c = DistributionConfig {
        adaptive: true,
        ..DistributionConfig::default()
    };
    let text = serde_json::to_string(&c).unwrap();
    let back: DistributionConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, c);
}
