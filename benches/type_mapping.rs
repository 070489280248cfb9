use criterion::{criterion_group, criterion_main, Criterion};
use kubeform::config::GeneratorOptions;
use kubeform::generator::{synthesize, synthesize_api};
use kubeform::mapper::{NumericPolicy, TypeMapper};
use kubeform::schema::{self, DescriptorFormat, ProviderSchema};
use std::hint::black_box;
use std::path::Path;

fn example_schema() -> ProviderSchema {
    let descriptor = include_str!("../tests/fixtures/wavefront_schema.json");
    schema::load_str(descriptor, DescriptorFormat::Json, None).expect("fixture loads")
}

fn bench_map_attributes(c: &mut Criterion) {
    let schema = example_schema();
    let alert = schema.resource("wavefront_alert").expect("alert resource");
    c.bench_function("map_alert_attributes", |b| {
        b.iter(|| {
            let mut mapper = TypeMapper::new("Alert", NumericPolicy::Lossless);
            let fields = mapper
                .map_fields(alert.attributes.iter(), &alert.name, &[])
                .expect("mapping succeeds");
            black_box((fields, mapper.into_nested_types()))
        })
    });
}

fn bench_synthesize_api(c: &mut Criterion) {
    let schema = example_schema();
    let alert = schema.resource("wavefront_alert").expect("alert resource");
    let options = GeneratorOptions::new("wavefront", Path::new("out"));
    let group = options.group();
    c.bench_function("synthesize_alert_api", |b| {
        b.iter(|| black_box(synthesize_api(alert, "Alert", &group, &options).expect("synthesis")))
    });
}

fn bench_synthesize_provider(c: &mut Criterion) {
    let schema = example_schema();
    let options = GeneratorOptions::new("wavefront", Path::new("out"));
    c.bench_function("synthesize_provider", |b| {
        b.iter(|| black_box(synthesize(&schema, &options).expect("synthesis")))
    });
}

criterion_group!(
    benches,
    bench_map_attributes,
    bench_synthesize_api,
    bench_synthesize_provider
);
criterion_main!(benches);
