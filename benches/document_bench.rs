use chrono::NaiveDate;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use sunat_cpe::core::*;
use sunat_cpe::transmission::{build_package, parse_response};
use sunat_cpe::ubl;

fn header() -> DocumentHeader {
    DocumentHeader {
        document_type: DocumentType::Invoice,
        series: "F001".into(),
        number: 42,
        issue_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        currency: "PEN".into(),
        operation_type: "0101".into(),
        environment: SunatEnvironment::Beta,
        reference: None,
    }
}

fn issuer() -> Issuer {
    IssuerBuilder::new("20123456789", "LAPIZ Y PAPEL S.A.C.")
        .trade_name("LAPIZ Y PAPEL")
        .address(
            AddressBuilder::new("150101", "AV. ABANCAY 123")
                .district("LIMA")
                .build(),
        )
        .build()
}

fn lines(n: usize) -> Vec<InvoiceLine> {
    (1..=n)
        .map(|i| {
            let builder = LineBuilder::new(
                format!("Articulo de oficina {i}"),
                Decimal::from(i % 7 + 1),
                dec!(3.50) + Decimal::new(i as i64, 2),
            )
            .product_code(format!("ART-{i:04}"));
            if i % 5 == 0 {
                builder.affectation(TaxAffectation::Exonerated).build()
            } else {
                builder.build()
            }
        })
        .collect()
}

fn bench_breakdown(c: &mut Criterion) {
    let lines = lines(100);
    c.bench_function("compute_breakdown_100_lines", |b| {
        b.iter(|| compute_breakdown(black_box(&lines), DEFAULT_IGV_RATE).unwrap())
    });
}

fn bench_build(c: &mut Criterion) {
    let customer = Customer::with_ruc("20987654321", "CLIENTE SAC");
    for n in [10, 500] {
        let lines = lines(n);
        let breakdown = compute_breakdown(&lines, DEFAULT_IGV_RATE).unwrap();
        c.bench_function(&format!("ubl_build_{n}_lines"), |b| {
            b.iter(|| {
                ubl::build(
                    black_box(&header()),
                    &issuer(),
                    &customer,
                    &lines,
                    &breakdown,
                )
                .unwrap()
            })
        });
    }
}

fn bench_package(c: &mut Criterion) {
    let lines = lines(100);
    let breakdown = compute_breakdown(&lines, DEFAULT_IGV_RATE).unwrap();
    let customer = Customer::with_ruc("20987654321", "CLIENTE SAC");
    let xml = ubl::build(&header(), &issuer(), &customer, &lines, &breakdown).unwrap();
    c.bench_function("zip_package_100_lines", |b| {
        b.iter(|| build_package("20123456789-01-F001-00000042.xml", black_box(xml.as_bytes())).unwrap())
    });
}

fn bench_parse_response(c: &mut Criterion) {
    use base64::Engine;
    let cdr = r#"<ar:ApplicationResponse xmlns:ar="urn:oasis:names:specification:ubl:schema:xsd:ApplicationResponse-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"><cbc:ResponseCode>0</cbc:ResponseCode><cbc:Description>aceptada</cbc:Description></ar:ApplicationResponse>"#;
    let archive = build_package("R-20123456789-01-F001-00000042.xml", cdr.as_bytes()).unwrap();
    let raw = format!(
        "<soap-env:Envelope xmlns:soap-env=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap-env:Body><br:sendBillResponse xmlns:br=\"http://service.sunat.gob.pe\"><applicationResponse>{}</applicationResponse></br:sendBillResponse></soap-env:Body></soap-env:Envelope>",
        base64::engine::general_purpose::STANDARD.encode(archive)
    );
    c.bench_function("parse_send_bill_response", |b| {
        b.iter(|| parse_response(black_box(raw.as_bytes())))
    });
}

criterion_group!(
    benches,
    bench_breakdown,
    bench_build,
    bench_package,
    bench_parse_response
);
criterion_main!(benches);
