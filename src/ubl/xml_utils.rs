use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::Decimal;
use std::io::Cursor;

use crate::core::{AMOUNT_DP, CpeError, UNIT_PRICE_DP, round_half_up};

fn xml_io(e: std::io::Error) -> CpeError {
    CpeError::Xml(format!("XML write error: {e}"))
}

/// Indented XML writer. Output depends only on the calls made, never on
/// locale or time.
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    pub fn new() -> Result<Self, CpeError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        Ok(Self { writer })
    }

    pub fn into_string(self) -> Result<String, CpeError> {
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| CpeError::Xml(format!("XML UTF-8 error: {e}")))
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, CpeError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, CpeError> {
        let mut elem = BytesStart::new(name);
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer
            .write_event(Event::Start(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, CpeError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    /// Write a self-closing element (`<ext:ExtensionContent/>`).
    pub fn empty_element(&mut self, name: &str) -> Result<&mut Self, CpeError> {
        self.writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, CpeError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    pub fn text_element_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, CpeError> {
        self.start_element_with_attrs(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Monetary amount with `currencyID`, always 2 decimals.
    pub fn amount_element(
        &mut self,
        name: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<&mut Self, CpeError> {
        self.text_element_with_attrs(name, &format_amount(amount), &[("currencyID", currency)])
    }

    /// Unit price with `currencyID`, always 5 decimals.
    pub fn price_element(
        &mut self,
        name: &str,
        price: Decimal,
        currency: &str,
    ) -> Result<&mut Self, CpeError> {
        self.text_element_with_attrs(name, &format_price(price), &[("currencyID", currency)])
    }

    /// Quantity with `unitCode` and the SUNAT catalog attributes.
    pub fn quantity_element(
        &mut self,
        name: &str,
        qty: Decimal,
        unit: &str,
    ) -> Result<&mut Self, CpeError> {
        self.text_element_with_attrs(
            name,
            &format_quantity(qty),
            &[
                ("unitCode", unit),
                ("unitCodeListID", "UN/ECE rec 20"),
                ("unitCodeListAgencyName", "United Nations Economic Commission for Europe"),
            ],
        )
    }
}

/// Fixed-point rendering with exactly `dp` decimals.
pub fn format_fixed(d: Decimal, dp: u32) -> String {
    let mut r = round_half_up(d, dp);
    r.rescale(dp);
    r.to_string()
}

/// Format an amount with exactly 2 decimals.
pub fn format_amount(d: Decimal) -> String {
    format_fixed(d, AMOUNT_DP)
}

/// Format a unit price with exactly 5 decimals.
pub fn format_price(d: Decimal) -> String {
    format_fixed(d, UNIT_PRICE_DP)
}

/// Quantities keep their own precision, with at least 2 decimals.
pub fn format_quantity(d: Decimal) -> String {
    let s = d.normalize().to_string();
    match s.find('.') {
        Some(dot) if s.len() - dot - 1 >= 2 => s,
        Some(dot) => format!("{s}{}", "0".repeat(2 - (s.len() - dot - 1))),
        None => format!("{s}.00"),
    }
}

/// Text of the first element whose local name (prefix ignored) is `local`.
///
/// Returns `Ok(None)` when no such element exists; `Err` only for
/// malformed XML.
pub fn first_element_text(xml: &str, local: &str) -> Result<Option<String>, CpeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut capturing = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if capturing {
                    depth += 1;
                } else if e.local_name().as_ref() == local.as_bytes() {
                    capturing = true;
                    depth = 0;
                }
            }
            Ok(Event::Empty(ref e)) => {
                if !capturing && e.local_name().as_ref() == local.as_bytes() {
                    return Ok(Some(String::new()));
                }
            }
            Ok(Event::Text(ref e)) if capturing => {
                let t = e
                    .unescape()
                    .map_err(|e| CpeError::Xml(format!("XML text error: {e}")))?;
                text.push_str(&t);
            }
            Ok(Event::CData(ref e)) if capturing => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(_)) if capturing => {
                if depth == 0 {
                    return Ok(Some(text));
                }
                depth -= 1;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CpeError::Xml(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    Ok(None)
}

/// Text of every element whose local name is `local`, in document order.
pub fn all_element_texts(xml: &str, local: &str) -> Result<Vec<String>, CpeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == local.as_bytes() => {
                current = Some(String::new());
            }
            Ok(Event::Text(ref e)) => {
                if let Some(buf) = current.as_mut() {
                    let t = e
                        .unescape()
                        .map_err(|e| CpeError::Xml(format!("XML text error: {e}")))?;
                    buf.push_str(&t);
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == local.as_bytes() => {
                if let Some(buf) = current.take() {
                    out.push(buf);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CpeError::Xml(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    Ok(out)
}

/// Whether an element with the given local name appears anywhere in `xml`.
pub fn has_element(xml: &str, local: &str) -> Result<bool, CpeError> {
    Ok(first_element_text(xml, local)?.is_some())
}
