use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, field, info, info_span, warn};
use uuid::Uuid;

use super::{EmissionError, EmissionRequest, EmissionSettings};
use crate::allocator::SequenceAllocator;
use crate::core::*;
use crate::repository::{DocumentSequenceRepo, EmittedDocumentRepo};
use crate::signing::{DisabledSigner, SignedDocument, Signer, SigningError};
use crate::storage::{self, DocumentStore};
use crate::transmission::{
    OutcomeStatus, TransmissionError, TransmissionOutcome, Transmitter, build_package,
};
use crate::ubl;

/// Composes allocation, rendering, signing, storage and transmission.
///
/// Cheap to share behind an `Arc`; every collaborator is itself shared.
pub struct EmissionService {
    issuer: Issuer,
    settings: EmissionSettings,
    allocator: SequenceAllocator,
    documents: Arc<dyn EmittedDocumentRepo>,
    signer: Arc<dyn Signer>,
    transmitter: Arc<dyn Transmitter>,
    store: DocumentStore,
    /// (sale, type) pairs with an emission currently running.
    in_flight: Mutex<HashSet<(String, DocumentType)>>,
}

/// Holds a sale's in-flight slot and frees it on drop.
struct SaleClaim<'a> {
    slots: &'a Mutex<HashSet<(String, DocumentType)>>,
    key: (String, DocumentType),
}

impl Drop for SaleClaim<'_> {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl EmissionService {
    /// A service with signing disabled. Use [`with_signer`](Self::with_signer)
    /// to plug in a real signer.
    pub fn new(
        issuer: Issuer,
        settings: EmissionSettings,
        sequences: Arc<dyn DocumentSequenceRepo>,
        documents: Arc<dyn EmittedDocumentRepo>,
        transmitter: Arc<dyn Transmitter>,
        store: DocumentStore,
    ) -> Self {
        Self {
            issuer,
            settings,
            allocator: SequenceAllocator::new(sequences),
            documents,
            signer: Arc::new(DisabledSigner),
            transmitter,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    pub fn settings(&self) -> &EmissionSettings {
        &self.settings
    }

    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }

    /// Emit one document.
    ///
    /// Returns the record in its terminal state (ACCEPTED, REJECTED or
    /// ERROR) once a PENDING record has been written. Errors are only
    /// returned for failures before that point, or when the record itself
    /// cannot be persisted.
    ///
    /// Only one emission per related sale and document type runs at a time
    /// within this service; a second one is refused with
    /// [`EmissionError::InProgress`]. The guard is in-process: services in
    /// separate processes sharing one database can still race past the
    /// already-accepted check.
    pub async fn emit(&self, request: EmissionRequest) -> Result<EmittedDocument, EmissionError> {
        let series = request.effective_series();
        let span = info_span!(
            "emit",
            doc_type = request.document_type.code(),
            series = %series,
            number = field::Empty,
        );
        self.run(request, series).instrument(span).await
    }

    /// Run [`emit`](Self::emit) on its own task. Dropping or timing out on
    /// the handle does not cancel the emission; the outcome stays
    /// observable through the persisted record.
    pub fn spawn_emit(
        self: &Arc<Self>,
        request: EmissionRequest,
    ) -> JoinHandle<Result<EmittedDocument, EmissionError>> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.emit(request).await })
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<EmittedDocument>, EmissionError> {
        self.documents
            .find_by_id(id)
            .await
            .map_err(EmissionError::Persistence)
    }

    /// Every attempt recorded for a sale, oldest first.
    pub async fn documents_for_sale(
        &self,
        sale_id: &str,
    ) -> Result<Vec<EmittedDocument>, EmissionError> {
        self.documents
            .find_by_sale(sale_id)
            .await
            .map_err(EmissionError::Persistence)
    }

    async fn run(
        &self,
        request: EmissionRequest,
        series: String,
    ) -> Result<EmittedDocument, EmissionError> {
        let document_type = request.document_type;

        let errors = self.check_request(&request, &series);
        if !errors.is_empty() {
            warn!(errors = errors.len(), "emission request refused");
            return Err(EmissionError::InvalidInput(errors));
        }
        let _claim = self.claim_sale(&request)?;
        let retry_count = self.prior_attempts(&request).await?;

        // 1. allocate
        let number = self
            .allocator
            .allocate(document_type, &series)
            .await
            .map_err(EmissionError::Allocation)?;
        tracing::Span::current().record("number", number.number());
        let document_id = number.document_id();

        // 2. breakdown
        let breakdown = compute_breakdown(&request.lines, self.settings.igv_rate).map_err(
            |source| EmissionError::Build {
                document_id: document_id.clone(),
                source,
            },
        )?;

        // 3. build; a failure burns the number
        let header = DocumentHeader {
            document_type,
            series: series.clone(),
            number: number.number(),
            issue_date: request.issue_date,
            currency: self.settings.currency.clone(),
            operation_type: self.settings.operation_type.clone(),
            environment: self.settings.environment,
            reference: request.reference.clone(),
        };
        let xml = ubl::build(
            &header,
            &self.issuer,
            &request.customer,
            &request.lines,
            &breakdown,
        )
        .map_err(|source| {
            error!(%document_id, error = %source, "document build failed, number burned");
            EmissionError::Build {
                document_id: document_id.clone(),
                source,
            }
        })?;
        debug!(%document_id, bytes = xml.len(), total = %breakdown.total, "document rendered");

        // 4. PENDING record
        let filename = number.filename(&self.issuer.ruc, document_type);
        let mut document = EmittedDocument::pending(
            document_type,
            series,
            number.number(),
            filename,
            request.related_sale_id.clone(),
            retry_count,
        );
        self.documents
            .insert(&document)
            .await
            .map_err(EmissionError::Persistence)?;
        info!(id = %document.id, filename = %document.filename, "document recorded as PENDING");

        // 5..8 never escape: each failure becomes a terminal status.
        self.sign_and_transmit(&mut document, &xml, request.issue_date)
            .await?;

        // 9. persist the terminal state
        self.documents.update(&document).await.map_err(|e| {
            error!(id = %document.id, error = %e, "failed to persist terminal status");
            EmissionError::Persistence(e)
        })?;
        match document.status {
            EmissionStatus::Accepted => info!(
                id = %document.id,
                code = document.authority_code.as_deref().unwrap_or_default(),
                "document accepted"
            ),
            status => warn!(
                id = %document.id,
                %status,
                code = document.authority_code.as_deref().unwrap_or_default(),
                message = document.authority_message.as_deref().unwrap_or_default(),
                "document not accepted"
            ),
        }
        Ok(document)
    }

    /// Input checks that must pass before a number is spent.
    fn check_request(&self, request: &EmissionRequest, series: &str) -> Vec<ValidationError> {
        let mut errors = SequenceAllocator::check_series(request.document_type, series);
        errors.extend(validate_customer(&request.customer, request.document_type));
        if request.document_type.is_note() {
            errors.extend(validate_customer_for_series(&request.customer, series));
        }
        errors.extend(validate_lines(&request.lines));
        errors.extend(validate_note_reference(
            request.document_type,
            request.reference.as_ref(),
        ));
        errors.extend(validate_currency(&self.settings.currency));
        errors.extend(validate_igv_rate(self.settings.igv_rate));
        errors
    }

    /// Reserve the request's sale for this emission, if it names one.
    fn claim_sale(&self, request: &EmissionRequest) -> Result<Option<SaleClaim<'_>>, EmissionError> {
        let Some(sale_id) = request.related_sale_id.clone() else {
            return Ok(None);
        };
        let key = (sale_id, request.document_type);
        let mut slots = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.insert(key.clone()) {
            warn!(sale_id = %key.0, "emission already running for sale");
            return Err(EmissionError::InProgress { sale_id: key.0 });
        }
        Ok(Some(SaleClaim {
            slots: &self.in_flight,
            key,
        }))
    }

    /// Earlier attempts for the same sale and type. Refuses the request if
    /// one of them was accepted.
    async fn prior_attempts(&self, request: &EmissionRequest) -> Result<u32, EmissionError> {
        let Some(sale_id) = request.related_sale_id.as_deref() else {
            return Ok(0);
        };
        let earlier: Vec<EmittedDocument> = self
            .documents
            .find_by_sale(sale_id)
            .await
            .map_err(EmissionError::Persistence)?
            .into_iter()
            .filter(|d| d.document_type == request.document_type)
            .collect();

        if let Some(accepted) = earlier
            .iter()
            .find(|d| d.status == EmissionStatus::Accepted)
        {
            warn!(%sale_id, document_id = %accepted.id, "sale already has an accepted document");
            return Err(EmissionError::AlreadyAccepted {
                sale_id: sale_id.to_string(),
                document_id: accepted.id,
            });
        }
        Ok(u32::try_from(earlier.len()).unwrap_or(u32::MAX))
    }

    /// Steps 5 to 8. Leaves `document` in a terminal state. Intermediate
    /// artifact updates are written through as they happen.
    async fn sign_and_transmit(
        &self,
        document: &mut EmittedDocument,
        xml: &str,
        issue_date: chrono::NaiveDate,
    ) -> Result<(), EmissionError> {
        // 5. sign
        if !self.signer.is_enabled() {
            warn!(id = %document.id, "signer disabled, document not transmitted");
            document.fail(None, &SigningError::Disabled.to_string())?;
            return Ok(());
        }
        let signed = match self.signer.sign(xml).await {
            Ok(signed) => signed,
            Err(e) => {
                warn!(id = %document.id, error = %e, unavailable = e.is_unavailable(), "signing failed");
                document.fail(None, &e.to_string())?;
                return Ok(());
            }
        };
        info!(id = %document.id, digest = %signed.digest, "document signed");

        // 6. package and store
        let package = match self.store_artifacts(document, &signed, issue_date).await {
            Ok(package) => package,
            Err(message) => {
                warn!(id = %document.id, %message, "artifact packaging failed");
                document.fail(None, &message)?;
                return Ok(());
            }
        };

        // 7. record hash and paths
        self.documents
            .update(document)
            .await
            .map_err(EmissionError::Persistence)?;

        // 8. transmit
        let package_name = format!("{}.zip", document.filename);
        debug!(endpoint = %self.settings.endpoint, bytes = package.len(), "submitting package");
        match self
            .transmitter
            .submit(
                &self.settings.endpoint,
                &self.settings.credentials,
                &package_name,
                &package,
            )
            .await
        {
            Ok(outcome) => self.apply_outcome(document, outcome).await?,
            Err(e) => {
                warn!(id = %document.id, error = %e, "transmission failed");
                document.fail(Some(transport_code(&e).to_string()), &e.to_string())?;
            }
        }
        Ok(())
    }

    /// Zip the signed XML, write both artifacts and attach them to the
    /// record. Returns the package bytes, or a diagnostic.
    async fn store_artifacts(
        &self,
        document: &mut EmittedDocument,
        signed: &SignedDocument,
        issue_date: chrono::NaiveDate,
    ) -> Result<Vec<u8>, String> {
        let entry = format!("{}.xml", document.filename);
        let package =
            build_package(&entry, signed.signed_xml.as_bytes()).map_err(|e| e.to_string())?;

        let xml_rel = storage::xml_path(issue_date, &document.filename);
        let zip_rel = storage::package_path(issue_date, &document.filename);
        let xml_path = self
            .store
            .save(&xml_rel, signed.signed_xml.as_bytes())
            .await
            .map_err(|e| e.to_string())?;
        let zip_path = self
            .store
            .save(&zip_rel, &package)
            .await
            .map_err(|e| e.to_string())?;

        document
            .attach_artifacts(
                signed.digest.clone(),
                xml_path.display().to_string(),
                zip_path.display().to_string(),
            )
            .map_err(|e| e.to_string())?;
        Ok(package)
    }

    async fn apply_outcome(
        &self,
        document: &mut EmittedDocument,
        outcome: TransmissionOutcome,
    ) -> Result<(), EmissionError> {
        let message = describe(&outcome);
        match outcome.status {
            OutcomeStatus::Accepted => {
                let archive = self.keep_archive(document, outcome.archive.as_deref()).await;
                document.accept(outcome.code, message, archive)?;
            }
            OutcomeStatus::Rejected => {
                let archive = self.keep_archive(document, outcome.archive.as_deref()).await;
                document.reject(outcome.code, message, archive)?;
            }
            OutcomeStatus::Error => {
                debug!(
                    id = %document.id,
                    raw_bytes = outcome.raw_response.len(),
                    "authority answer unusable"
                );
                document.fail(Some(outcome.code), &message)?;
            }
        }
        Ok(())
    }

    /// Store the CDR if one came back. A storage failure loses only the
    /// archive copy, not the verdict.
    async fn keep_archive(&self, document: &EmittedDocument, archive: Option<&[u8]>) -> Option<String> {
        let bytes = archive?;
        match self
            .store
            .save_response_archive(&document.filename, bytes)
            .await
        {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                warn!(id = %document.id, error = %e, "could not store response archive");
                None
            }
        }
    }
}

impl std::fmt::Debug for EmissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmissionService")
            .field("issuer", &self.issuer.ruc)
            .field("environment", &self.settings.environment)
            .field("signer_enabled", &self.signer.is_enabled())
            .field("store", &self.store.base())
            .finish_non_exhaustive()
    }
}

/// Description plus any CDR observations.
fn describe(outcome: &TransmissionOutcome) -> String {
    if outcome.notes.is_empty() {
        outcome.description.clone()
    } else {
        format!("{} | {}", outcome.description, outcome.notes.join(" | "))
    }
}

fn transport_code(error: &TransmissionError) -> &'static str {
    match error {
        TransmissionError::Timeout(_) => "TIMEOUT",
        TransmissionError::Connection { .. } => "CONNECTION",
        TransmissionError::Http { .. } => "HTTP",
        TransmissionError::Packaging(_) => "PACKAGING",
    }
}
