//! Benchmarks pour le parsing KML

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fmt::Write;

/// Génère un document avec `count` polygones de 5 points
fn generate_kml(count: usize) -> String {
    let mut kml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<kml><Document>\n");
    for i in 0..count {
        let x = 105.0 + (i % 1000) as f64 * 0.001;
        let y = 21.0 + (i / 1000) as f64 * 0.001;
        let _ = write!(
            kml,
            "<Placemark><name>Lot {i}</name><ExtendedData><Data name=\"area\"><value>{i}</value></Data></ExtendedData>\
             <Polygon><outerBoundaryIs><LinearRing><coordinates>\
             {x},{y},0 {x1},{y},0 {x1},{y1},0 {x},{y1},0 {x},{y},0\
             </coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>\n",
            i = i,
            x = x,
            y = y,
            x1 = x + 0.0005,
            y1 = y + 0.0005,
        );
    }
    kml.push_str("</Document></kml>\n");
    kml
}

fn bench_parse_kml(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_kml");

    for count in [100usize, 1_000, 10_000] {
        let kml = generate_kml(count);
        group.throughput(Throughput::Bytes(kml.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &kml, |b, text| {
            b.iter(|| {
                let result = kmlgeo::parse_kml(black_box(text)).unwrap();
                black_box(result)
            })
        });
    }

    group.finish();
}

fn bench_statistics_and_bounds(c: &mut Criterion) {
    let result = kmlgeo::parse_kml(&generate_kml(10_000)).unwrap();

    c.bench_function("statistics_and_bounds", |b| {
        b.iter(|| {
            let stats = kmlgeo::compute_statistics(black_box(&result));
            let bounds = kmlgeo::compute_bounds(black_box(&result));
            black_box((stats, bounds))
        })
    });
}

criterion_group!(benches, bench_parse_kml, bench_statistics_and_bounds);
criterion_main!(benches);
