use kube::CustomResourceExt;
fn main() {
    print!(
        "{}",
        serde_yaml::to_string(&keyvalue_operator::resources::keyvaluedata::KeyValueData::crd())
            .unwrap()
    )
}
