use cfmetrics_common::identity::IdentityContext;
use cfmetrics_exposition::MetricFamilies;

pub fn relabel(families: &MetricFamilies, identity: &IdentityContext) -> MetricFamilies {
    let identity_labels = identity.labels();

    families
        .iter()
        .map(|(name, family)| {
            let mut relabeled = family.clone();
            for series in &mut relabeled.series {
                series.labels.reserve(identity_labels.len());
                series.labels.extend(
                    identity_labels
                        .iter()
                        .map(|(label, value)| ((*label).to_string(), value.clone())),
                );
            }
            (name.clone(), relabeled)
        })
        .collect()
}
