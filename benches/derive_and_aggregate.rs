use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use cnq_engine::{
    CostSettings, FilterSpec, GroupField, MetricField, MetricSpec, RawTable, SemanticField,
    aggregate, derive_costs, filter, resolve,
};

fn generate_export(rows: usize) -> RawTable {
    let headers = [
        "DATE",
        "IDChaineMontage",
        "IDOperation",
        "TypeDefaut",
        "Quantite",
        "NbrReclamations",
        "temps",
        "TauxHoraire",
        "DeuxiemeChoix",
        "Note",
        "ValeurOF",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    let rows = (0..rows)
        .map(|i| {
            vec![
                format!("2023-{:02}-{:02}", (i % 12) + 1, (i % 28) + 1),
                format!("CH{}", i % 8),
                format!("OP{}", i % 40),
                ["Couture", "Tache", "Coupe"][i % 3].to_string(),
                ((i % 50) + 1).to_string(),
                (i % 7).to_string(),
                "0.25".to_string(),
                "18,5".to_string(),
                (i % 3).to_string(),
                (i % 4).to_string(),
                ((i % 20) * 100).to_string(),
            ]
        })
        .collect();
    RawTable::new(headers, rows)
}

fn bench_derive_and_aggregate(c: &mut Criterion) {
    let table = generate_export(50_000);
    let resolution = resolve(&table.headers);
    let settings = CostSettings::default();
    let records = derive_costs(&table, &resolution, &settings);
    let spec = FilterSpec::new()
        .with_values(SemanticField::Chain, ["CH1", "CH2", "CH3"])
        .with_range(MetricField::Cnq, Some(50.0), None);
    let group_by = [GroupField::Dimension(SemanticField::Chain), GroupField::Period];
    let metrics = [
        MetricSpec::sum(MetricField::Cnq),
        MetricSpec::sum(MetricField::ReworkCost),
        MetricSpec::sum(MetricField::ScrapCost),
    ];

    let mut group = c.benchmark_group("cnq_pipeline");

    group.bench_function("derive_costs", |b| {
        b.iter(|| derive_costs(&table, &resolution, &settings));
    });

    group.bench_function("filter_then_aggregate", |b| {
        b.iter_batched(
            || records.clone(),
            |records| {
                let kept = filter(&records, &spec).expect("valid filter");
                aggregate(&kept, &group_by, &metrics)
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_derive_and_aggregate);
criterion_main!(benches);
