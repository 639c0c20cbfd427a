use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{Credentials, TransmissionError};
use crate::ubl::xml_utils::XmlWriter;

const SOAPENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SER_NS: &str = "http://service.sunat.gob.pe";
const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// Build the `sendBill` SOAP envelope for a zipped document.
pub fn send_bill_envelope(
    credentials: &Credentials,
    file_name: &str,
    package: &[u8],
) -> Result<String, TransmissionError> {
    let content = STANDARD.encode(package);
    render(credentials, file_name, &content)
        .map_err(|e| TransmissionError::Packaging(e.to_string()))
}

fn render(
    credentials: &Credentials,
    file_name: &str,
    content: &str,
) -> Result<String, crate::core::CpeError> {
    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        "soapenv:Envelope",
        &[
            ("xmlns:soapenv", SOAPENV_NS),
            ("xmlns:ser", SER_NS),
            ("xmlns:wsse", WSSE_NS),
        ],
    )?;

    w.start_element("soapenv:Header")?;
    w.start_element("wsse:Security")?;
    w.start_element("wsse:UsernameToken")?;
    w.text_element("wsse:Username", &credentials.username)?;
    w.text_element("wsse:Password", &credentials.password)?;
    w.end_element("wsse:UsernameToken")?;
    w.end_element("wsse:Security")?;
    w.end_element("soapenv:Header")?;

    w.start_element("soapenv:Body")?;
    w.start_element("ser:sendBill")?;
    w.text_element("fileName", file_name)?;
    w.text_element("contentFile", content)?;
    w.end_element("ser:sendBill")?;
    w.end_element("soapenv:Body")?;

    w.end_element("soapenv:Envelope")?;
    w.into_string()
}
