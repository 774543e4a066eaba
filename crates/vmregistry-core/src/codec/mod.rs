//! Domain XML codec
//!
//! The hypervisor's domain description is opaque to vmregistry except for
//! two extraction points:
//!
//! ```text
//! <domain>
//!   <metadata>
//!     <vmregistry:vmregistry xmlns:vmregistry="...">
//!       <vmregistry:ip>10.0.0.5</vmregistry:ip>      ← embedded IP
//!     </vmregistry:vmregistry>
//!   </metadata>
//!   <devices>
//!     <interface type="bridge">
//!       <mac address="52:54:00:12:34:56"/>          ← one per interface
//!     </interface>
//!   </devices>
//! </domain>
//! ```
//!
//! Elements are matched by local name, so the metadata namespace prefix is
//! free. New descriptions are rendered from a [`DomainTemplate`].

mod template;

pub use template::{DomainParams, DomainTemplate};

use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Namespace URI templates should declare for the metadata element
pub const METADATA_NAMESPACE: &str = "https://github.com/vmregistry/vmregistry";

/// Local name of the custom metadata element
pub const METADATA_ELEMENT: &str = "vmregistry";

const NAME_PATH: [&str; 2] = ["domain", "name"];
const INTERFACE_PATH: [&str; 3] = ["domain", "devices", "interface"];
const MAC_PATH: [&str; 4] = ["domain", "devices", "interface", "mac"];
const IP_PATH: [&str; 4] = ["domain", "metadata", METADATA_ELEMENT, "ip"];

/// Values extracted from a domain description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainInfo {
    /// `<name>` text, empty if absent
    pub name: String,
    /// One MAC per `<interface>`, in document order; empty if an interface has no `<mac>`
    pub mac_addresses: Vec<String>,
    /// Metadata IP, empty if absent
    pub ip: String,
}

impl DomainInfo {
    /// MAC address of the first interface
    pub fn first_mac(&self) -> Option<&str> {
        self.mac_addresses.first().map(String::as_str)
    }
}

/// Decode the name, interface MACs and metadata IP from a domain description
///
/// A missing IP is not an error: domains can be read before their metadata
/// is complete.
///
/// # Errors
///
/// `MalformedDomainXml` if the document is not well-formed XML or its root
/// element is not `<domain>`.
pub fn parse(xml: &str) -> Result<DomainInfo> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut info = DomainInfo::default();
    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::malformed_xml(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(element) => {
                enter(&mut path, &element, &mut saw_root)?;
                visit(&path, &element, &mut info)?;
            }
            Event::Empty(element) => {
                enter(&mut path, &element, &mut saw_root)?;
                visit(&path, &element, &mut info)?;
                path.pop();
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(text) => {
                if let Some(field) = text_field(&path, &mut info) {
                    let text = text
                        .unescape()
                        .map_err(|e| Error::malformed_xml(format!("invalid text: {}", e)))?;
                    field.push_str(text.trim());
                }
            }
            Event::CData(data) => {
                if let Some(field) = text_field(&path, &mut info) {
                    field.push_str(String::from_utf8_lossy(&data).trim());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(Error::malformed_xml("document has no <domain> element"));
    }
    if !path.is_empty() {
        return Err(Error::malformed_xml(format!(
            "unexpected end of document inside <{}>",
            path.join("/")
        )));
    }

    Ok(info)
}

fn enter(path: &mut Vec<String>, element: &BytesStart<'_>, saw_root: &mut bool) -> Result<()> {
    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();

    if path.is_empty() {
        if *saw_root {
            return Err(Error::malformed_xml("multiple root elements"));
        }
        if name != "domain" {
            return Err(Error::malformed_xml(format!(
                "root element is <{}>, expected <domain>",
                name
            )));
        }
        *saw_root = true;
    }

    path.push(name);
    Ok(())
}

fn visit(path: &[String], element: &BytesStart<'_>, info: &mut DomainInfo) -> Result<()> {
    if at(path, &INTERFACE_PATH) {
        info.mac_addresses.push(String::new());
    } else if at(path, &MAC_PATH) {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::malformed_xml(format!("invalid attribute: {}", e)))?;
            if attr.key.local_name().as_ref() == b"address" {
                let value = attr
                    .unescape_value()
                    .map_err(|e| Error::malformed_xml(format!("invalid mac address: {}", e)))?;
                if let Some(mac) = info.mac_addresses.last_mut() {
                    *mac = value.into_owned();
                }
            }
        }
    }
    Ok(())
}

fn text_field<'a>(path: &[String], info: &'a mut DomainInfo) -> Option<&'a mut String> {
    if at(path, &IP_PATH) {
        Some(&mut info.ip)
    } else if at(path, &NAME_PATH) {
        Some(&mut info.name)
    } else {
        None
    }
}

fn at(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}
