//! End-to-end emission tests with counting test doubles for the signer and
//! the transmitter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sunat_cpe::core::*;
use sunat_cpe::repository::{
    DocumentSequenceRepo, EmittedDocumentRepo, MemoryDocumentRepo, MemorySequenceRepo,
};
use sunat_cpe::signing::{SignedDocument, Signer, SigningError, XadesSigner, digest_of};
use sunat_cpe::storage::DocumentStore;
use sunat_cpe::transmission::{
    Credentials, TransmissionError, TransmissionOutcome, Transmitter, build_package,
    parse_response,
};
use sunat_cpe::{EmissionError, EmissionRequest, EmissionService, EmissionSettings};
use tempfile::TempDir;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Signs by appending a marker comment, so the signed bytes differ from the
/// rendered ones.
#[derive(Default)]
struct EchoSigner {
    calls: AtomicUsize,
}

#[async_trait]
impl Signer for EchoSigner {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn sign(&self, xml: &str) -> Result<SignedDocument, SigningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SignedDocument::new(format!("{xml}<!-- signed -->")))
    }
}

struct RefusingSigner;

#[async_trait]
impl Signer for RefusingSigner {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn sign(&self, _xml: &str) -> Result<SignedDocument, SigningError> {
        Err(SigningError::Rejected("certificate expired".into()))
    }
}

enum Reply {
    Cdr(&'static str, &'static str),
    Fault(&'static str, &'static str),
    Transport,
}

struct FakeTransmitter {
    reply: Reply,
    calls: AtomicUsize,
    packages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeTransmitter {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            packages: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transmitter for FakeTransmitter {
    async fn submit(
        &self,
        _endpoint: &str,
        credentials: &Credentials,
        package_name: &str,
        package: &[u8],
    ) -> Result<TransmissionOutcome, TransmissionError> {
        assert_eq!(credentials.username, "20123456789");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.packages
            .lock()
            .unwrap()
            .push((package_name.to_string(), package.to_vec()));

        match self.reply {
            Reply::Cdr(code, description) => Ok(parse_response(&soap_with_cdr(code, description))),
            Reply::Fault(code, message) => Ok(parse_response(
                format!(
                    r#"<soap-env:Envelope xmlns:soap-env="http://schemas.xmlsoap.org/soap/envelope/">
<soap-env:Body><soap-env:Fault><faultcode>{code}</faultcode><faultstring>{message}</faultstring></soap-env:Fault></soap-env:Body>
</soap-env:Envelope>"#
                )
                .as_bytes(),
            )),
            Reply::Transport => Err(TransmissionError::Timeout(30)),
        }
    }
}

fn soap_with_cdr(code: &str, description: &str) -> Vec<u8> {
    let cdr = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ar:ApplicationResponse xmlns:ar="urn:oasis:names:specification:ubl:schema:xsd:ApplicationResponse-2" xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
  <cac:DocumentResponse>
    <cac:Response>
      <cbc:ResponseCode>{code}</cbc:ResponseCode>
      <cbc:Description>{description}</cbc:Description>
    </cac:Response>
  </cac:DocumentResponse>
</ar:ApplicationResponse>"#
    );
    let archive = build_package("R-20123456789-01-F001-00000001.xml", cdr.as_bytes()).unwrap();
    format!(
        r#"<soap-env:Envelope xmlns:soap-env="http://schemas.xmlsoap.org/soap/envelope/">
<soap-env:Body><br:sendBillResponse xmlns:br="http://service.sunat.gob.pe">
<applicationResponse>{}</applicationResponse>
</br:sendBillResponse></soap-env:Body></soap-env:Envelope>"#,
        STANDARD.encode(archive)
    )
    .into_bytes()
}

/// Holds every submission until released, so a test can act while an
/// emission is mid-flight.
#[derive(Default)]
struct GatedTransmitter {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl Transmitter for GatedTransmitter {
    async fn submit(
        &self,
        _endpoint: &str,
        _credentials: &Credentials,
        _package_name: &str,
        _package: &[u8],
    ) -> Result<TransmissionOutcome, TransmissionError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(parse_response(&soap_with_cdr("0", "aceptada")))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
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

fn settings() -> EmissionSettings {
    EmissionSettings::new(
        SunatEnvironment::Beta,
        "https://e-beta.sunat.gob.pe/ol-ti-itcpfegem-beta/billService",
        Credentials::for_environment(SunatEnvironment::Beta, "20123456789", "MODDATOS", "moddatos"),
    )
}

fn invoice_request() -> EmissionRequest {
    EmissionRequest::new(
        DocumentType::Invoice,
        date(),
        Customer::with_ruc("20987654321", "CLIENTE SAC"),
        vec![
            LineBuilder::new("Papel bond A4 x 500", dec!(2), dec!(59))
                .product_code("PAP-A4")
                .build(),
        ],
    )
}

struct Harness {
    service: Arc<EmissionService>,
    sequences: Arc<MemorySequenceRepo>,
    documents: Arc<MemoryDocumentRepo>,
    transmitter: Arc<FakeTransmitter>,
    _dir: TempDir,
}

fn harness_with(issuer: Issuer, signer: Option<Arc<dyn Signer>>, reply: Reply) -> Harness {
    let dir = TempDir::new().unwrap();
    let sequences = Arc::new(MemorySequenceRepo::new());
    let documents = Arc::new(MemoryDocumentRepo::new());
    let transmitter = FakeTransmitter::new(reply);

    let mut service = EmissionService::new(
        issuer,
        settings(),
        sequences.clone(),
        documents.clone(),
        transmitter.clone(),
        DocumentStore::new(dir.path()),
    );
    if let Some(signer) = signer {
        service = service.with_signer(signer);
    }

    Harness {
        service: Arc::new(service),
        sequences,
        documents,
        transmitter,
        _dir: dir,
    }
}

/// A service over fresh in-memory repositories with explicit settings and
/// transmitter.
fn service_with(
    settings: EmissionSettings,
    transmitter: Arc<dyn Transmitter>,
    dir: &TempDir,
) -> EmissionService {
    EmissionService::new(
        issuer(),
        settings,
        Arc::new(MemorySequenceRepo::new()),
        Arc::new(MemoryDocumentRepo::new()),
        transmitter,
        DocumentStore::new(dir.path()),
    )
    .with_signer(Arc::new(EchoSigner::default()))
}

async fn last_invoice_number(service: &EmissionService) -> u32 {
    service
        .allocator()
        .last_issued(DocumentType::Invoice, "F001")
        .await
        .unwrap()
}

fn harness(reply: Reply) -> Harness {
    harness_with(issuer(), Some(Arc::new(EchoSigner::default())), reply)
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accepted_document_stores_every_artifact() {
    let h = harness(Reply::Cdr("0", "La Factura numero F001-00000001, ha sido aceptada"));
    let doc = h.service.emit(invoice_request()).await.unwrap();

    assert_eq!(doc.status, EmissionStatus::Accepted);
    assert_eq!(doc.authority_code.as_deref(), Some("0"));
    assert_eq!(doc.filename, "20123456789-01-F001-00000001");
    assert_eq!(doc.number, 1);
    assert_eq!(h.transmitter.calls(), 1);

    let xml_path = doc.xml_storage_path.clone().unwrap();
    let signed = std::fs::read(&xml_path).unwrap();
    assert!(String::from_utf8_lossy(&signed).ends_with("<!-- signed -->"));
    assert_eq!(doc.content_hash, digest_of(&signed));

    let zip_path = doc.package_storage_path.clone().unwrap();
    assert!(zip_path.ends_with("2024-05-02/20123456789-01-F001-00000001.zip"));
    let packages = h.transmitter.packages.lock().unwrap();
    assert_eq!(packages[0].0, "20123456789-01-F001-00000001.zip");
    assert_eq!(std::fs::read(&zip_path).unwrap(), packages[0].1);

    let cdr_path = doc.response_archive_path.clone().unwrap();
    assert!(cdr_path.ends_with("cdr/R-20123456789-01-F001-00000001.zip"));
    assert!(std::path::Path::new(&cdr_path).exists());

    let stored = h.documents.find_by_id(doc.id).await.unwrap().unwrap();
    assert_eq!(stored, doc);
}

#[tokio::test]
async fn business_rejection_is_rejected_not_error() {
    let h = harness(Reply::Cdr(
        "2335",
        "El documento electronico ingresado ha sido alterado",
    ));
    let doc = h.service.emit(invoice_request()).await.unwrap();

    assert_eq!(doc.status, EmissionStatus::Rejected);
    assert_eq!(doc.authority_code.as_deref(), Some("2335"));
    assert!(doc.authority_message.unwrap().contains("alterado"));
    assert!(doc.response_archive_path.is_some());
}

#[tokio::test]
async fn soap_fault_is_error_with_fault_code() {
    let h = harness(Reply::Fault("soap-env:Client.0111", "No tiene el perfil para enviar comprobantes electronicos"));
    let doc = h.service.emit(invoice_request()).await.unwrap();

    assert_eq!(doc.status, EmissionStatus::Error);
    assert_eq!(doc.authority_code.as_deref(), Some("soap-env:Client.0111"));
    assert!(doc.authority_message.unwrap().contains("perfil"));
    assert!(doc.response_archive_path.is_none());
}

#[tokio::test]
async fn transport_failure_is_recorded_not_raised() {
    let h = harness(Reply::Transport);
    let doc = h.service.emit(invoice_request()).await.unwrap();

    assert_eq!(doc.status, EmissionStatus::Error);
    assert_eq!(doc.authority_code.as_deref(), Some("TIMEOUT"));
    assert!(doc.package_storage_path.is_some());
    let stored = h.documents.find_by_id(doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmissionStatus::Error);
}

// ---------------------------------------------------------------------------
// Signer states
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_signer_never_transmits() {
    let h = harness_with(issuer(), None, Reply::Cdr("0", "ok"));
    let doc = h.service.emit(invoice_request()).await.unwrap();

    assert_eq!(doc.status, EmissionStatus::Error);
    assert!(doc.authority_message.as_deref().unwrap().contains("disabled"));
    assert!(doc.package_storage_path.is_none());
    assert!(doc.xml_storage_path.is_none());
    assert_eq!(h.transmitter.calls(), 0);
}

#[tokio::test]
async fn unreachable_signer_yields_error_without_package() {
    let signer = XadesSigner::new("http://127.0.0.1:1", "prod").unwrap();
    let h = harness_with(issuer(), Some(Arc::new(signer)), Reply::Cdr("0", "ok"));
    let doc = h.service.emit(invoice_request()).await.unwrap();

    assert_eq!(doc.status, EmissionStatus::Error);
    let message = doc.authority_message.clone().unwrap();
    assert!(!message.is_empty());
    assert!(message.contains("unavailable"), "{message}");
    assert!(doc.package_storage_path.is_none());
    assert_eq!(h.transmitter.calls(), 0);

    let stored = h.documents.find_by_id(doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmissionStatus::Error);
}

#[tokio::test]
async fn signer_refusal_keeps_its_own_text() {
    let h = harness_with(issuer(), Some(Arc::new(RefusingSigner)), Reply::Cdr("0", "ok"));
    let doc = h.service.emit(invoice_request()).await.unwrap();

    assert_eq!(doc.status, EmissionStatus::Error);
    assert!(doc.authority_message.unwrap().contains("certificate expired"));
    assert_eq!(h.transmitter.calls(), 0);
}

// ---------------------------------------------------------------------------
// Pre-record failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_lines_consume_no_number() {
    let h = harness(Reply::Cdr("0", "ok"));
    let mut request = invoice_request();
    request.lines.clear();

    let err = h.service.emit(request).await.unwrap_err();
    assert!(matches!(err, EmissionError::InvalidInput(_)));
    assert!(
        h.sequences
            .current(DocumentType::Invoice, "F001")
            .await
            .unwrap()
            .is_none()
    );
    assert!(h.documents.all().unwrap().is_empty());
}

#[tokio::test]
async fn receipt_series_for_invoice_is_refused() {
    let h = harness(Reply::Cdr("0", "ok"));
    let err = h
        .service
        .emit(invoice_request().series("B001"))
        .await
        .unwrap_err();
    match err {
        EmissionError::InvalidInput(errors) => {
            assert!(errors.iter().any(|e| e.field == "series"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn oversized_amounts_are_refused_before_allocation() {
    let h = harness(Reply::Cdr("0", "ok"));
    for (quantity, price) in [
        (dec!(1000000000000000), dec!(1000000000000000)),
        (Decimal::MAX, dec!(1)),
        (dec!(1), Decimal::MAX),
    ] {
        let mut request = invoice_request();
        request.lines = vec![LineBuilder::new("Papel bond A4", quantity, price).build()];

        let err = h.service.emit(request).await.unwrap_err();
        match err {
            EmissionError::InvalidInput(errors) => {
                assert!(errors.iter().any(|e| e.field.starts_with("lines[0]")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(last_invoice_number(&h.service).await, 0);
    assert!(h.documents.all().unwrap().is_empty());
    assert_eq!(h.transmitter.calls(), 0);
}

#[tokio::test]
async fn extreme_but_valid_amounts_reach_a_terminal_state() {
    let h = harness(Reply::Cdr("0", "aceptada"));
    for (quantity, price) in [
        (MAX_QUANTITY, MAX_UNIT_PRICE),
        (Decimal::from_parts(1, 0, 0, false, 28), dec!(59)),
    ] {
        let mut request = invoice_request();
        request.lines = vec![LineBuilder::new("Papel bond A4", quantity, price).build()];
        match h.service.emit(request).await {
            Ok(doc) => assert!(doc.status.is_terminal()),
            Err(EmissionError::Build { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}

#[tokio::test]
async fn out_of_range_igv_rate_consumes_no_number() {
    let dir = TempDir::new().unwrap();
    let transmitter = FakeTransmitter::new(Reply::Cdr("0", "ok"));
    let service = service_with(settings().igv_rate(dec!(1.5)), transmitter.clone(), &dir);

    for _ in 0..3 {
        let err = service.emit(invoice_request()).await.unwrap_err();
        match err {
            EmissionError::InvalidInput(errors) => {
                assert!(errors.iter().any(|e| e.field == "igv_rate"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(last_invoice_number(&service).await, 0);
    assert_eq!(transmitter.calls(), 0);
}

#[tokio::test]
async fn build_failure_burns_the_number() {
    let mut broken = issuer();
    broken.address.address_type_code = String::new();
    let h = harness_with(broken, Some(Arc::new(EchoSigner::default())), Reply::Cdr("0", "ok"));

    let err = h.service.emit(invoice_request()).await.unwrap_err();
    match err {
        EmissionError::Build { document_id, source } => {
            assert_eq!(document_id, "F001-00000001");
            assert!(source.to_string().contains("3030"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        h.service
            .allocator()
            .last_issued(DocumentType::Invoice, "F001")
            .await
            .unwrap(),
        1
    );
    assert!(h.documents.all().unwrap().is_empty());
    assert_eq!(h.transmitter.calls(), 0);
}

// ---------------------------------------------------------------------------
// Retries and idempotency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_allocates_a_fresh_number() {
    let h = harness(Reply::Cdr("2335", "alterado"));
    let first = h
        .service
        .emit(invoice_request().related_sale("sale-7"))
        .await
        .unwrap();
    let second = h
        .service
        .emit(invoice_request().related_sale("sale-7"))
        .await
        .unwrap();

    assert_eq!(first.number, 1);
    assert_eq!(first.retry_count, 0);
    assert_eq!(second.number, 2);
    assert_eq!(second.retry_count, 1);

    let history = h.service.documents_for_sale("sale-7").await.unwrap();
    assert_eq!(
        history.iter().map(|d| d.number).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn accepted_sale_is_not_emitted_twice() {
    let h = harness(Reply::Cdr("0", "aceptada"));
    let accepted = h
        .service
        .emit(invoice_request().related_sale("sale-1"))
        .await
        .unwrap();

    let err = h
        .service
        .emit(invoice_request().related_sale("sale-1"))
        .await
        .unwrap_err();
    match err {
        EmissionError::AlreadyAccepted { sale_id, document_id } => {
            assert_eq!(sale_id, "sale-1");
            assert_eq!(document_id, accepted.id);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.transmitter.calls(), 1);
    assert_eq!(
        h.service
            .allocator()
            .last_issued(DocumentType::Invoice, "F001")
            .await
            .unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_sale_cannot_run_twice_at_once() {
    let dir = TempDir::new().unwrap();
    let gate = Arc::new(GatedTransmitter::default());
    let service = Arc::new(service_with(settings(), gate.clone(), &dir));

    let first = service.spawn_emit(invoice_request().related_sale("sale-3"));
    gate.entered.notified().await;

    let err = service
        .emit(invoice_request().related_sale("sale-3"))
        .await
        .unwrap_err();
    match err {
        EmissionError::InProgress { sale_id } => assert_eq!(sale_id, "sale-3"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(last_invoice_number(&service).await, 1);

    gate.release.notify_one();
    let accepted = first.await.unwrap().unwrap();
    assert_eq!(accepted.status, EmissionStatus::Accepted);

    // The slot is free again; the accepted check now answers.
    let err = service
        .emit(invoice_request().related_sale("sale-3"))
        .await
        .unwrap_err();
    assert!(matches!(err, EmissionError::AlreadyAccepted { .. }), "{err}");
    assert_eq!(last_invoice_number(&service).await, 1);
}

// ---------------------------------------------------------------------------
// Document kinds and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn credit_note_uses_its_own_series_and_shape() {
    let h = harness(Reply::Cdr("0", "aceptada"));
    let request = EmissionRequest::new(
        DocumentType::CreditNote,
        date(),
        Customer::with_ruc("20987654321", "CLIENTE SAC"),
        vec![LineBuilder::new("Devolucion papel bond", dec!(1), dec!(59)).build()],
    )
    .reference(NoteReference {
        document_type: DocumentType::Invoice,
        document_id: "F001-00000001".into(),
        reason_code: "07".into(),
        description: "Devolucion por item".into(),
    });

    let doc = h.service.emit(request).await.unwrap();
    assert_eq!(doc.status, EmissionStatus::Accepted);
    assert_eq!(doc.series, "FC01");
    assert_eq!(doc.filename, "20123456789-07-FC01-00000001");

    let xml = std::fs::read_to_string(doc.xml_storage_path.unwrap()).unwrap();
    assert!(xml.contains("<CreditNote"));
    assert!(xml.contains("<cbc:ReferenceID>F001-00000001</cbc:ReferenceID>"));
}

#[tokio::test]
async fn anonymous_receipt_is_emitted() {
    let h = harness(Reply::Cdr("0", "aceptada"));
    let request = EmissionRequest::new(
        DocumentType::Receipt,
        date(),
        Customer::anonymous(),
        vec![
            LineBuilder::new("Lapicero azul", dec!(3), dec!(1.50)).build(),
            LineBuilder::new("Libro escolar", dec!(1), dec!(35))
                .affectation(TaxAffectation::Exonerated)
                .build(),
        ],
    );
    let doc = h.service.emit(request).await.unwrap();
    assert_eq!(doc.status, EmissionStatus::Accepted);
    assert_eq!(doc.filename, "20123456789-03-B001-00000001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_emissions_get_distinct_numbers() {
    let h = harness(Reply::Cdr("0", "aceptada"));
    let handles: Vec<_> = (0..12)
        .map(|_| h.service.spawn_emit(invoice_request()))
        .collect();

    let mut numbers = Vec::new();
    for handle in handles {
        let doc = handle.await.unwrap().unwrap();
        assert_eq!(doc.status, EmissionStatus::Accepted);
        numbers.push(doc.number);
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=12).collect::<Vec<u32>>());
    assert_eq!(h.transmitter.calls(), 12);
}

#[tokio::test]
async fn find_returns_persisted_state() {
    let h = harness(Reply::Cdr("0", "aceptada"));
    let doc = h.service.emit(invoice_request()).await.unwrap();
    let found = h.service.find(doc.id).await.unwrap().unwrap();
    assert_eq!(found.status, EmissionStatus::Accepted);
    assert!(h.service.find(uuid::Uuid::new_v4()).await.unwrap().is_none());
}
