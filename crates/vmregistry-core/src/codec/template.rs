// # Domain Template
//
// Renders new domain descriptions from an operator-supplied template.
//
// ## Placeholders
//
// - `{{.Name}}`: domain name
// - `{{.Memory}}`: memory in bytes
// - `{{.Cores}}`: virtual CPU count
// - `{{.DiskPath}}`: block-device path of the VM volume
// - `{{.IP}}`: allocated address, to be embedded in the metadata element
//
// Whitespace inside the braces is ignored. Substituted values are XML-escaped.
//
// ## Example
//
// ```xml
// <domain type="kvm">
//   <name>{{.Name}}</name>
//   <memory unit="b">{{.Memory}}</memory>
//   <vcpu>{{.Cores}}</vcpu>
//   <metadata>
//     <vmregistry:vmregistry xmlns:vmregistry="https://github.com/vmregistry/vmregistry">
//       <vmregistry:ip>{{.IP}}</vmregistry:ip>
//     </vmregistry:vmregistry>
//   </metadata>
//   <devices>
//     <disk type="block" device="disk"><source dev="{{.DiskPath}}"/></disk>
//     <interface type="bridge"><source bridge="br0"/></interface>
//   </devices>
// </domain>
// ```

use crate::error::{Error, Result};
use quick_xml::escape::escape;
use std::path::Path;

/// Values substituted into a domain template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainParams<'a> {
    pub name: &'a str,
    pub memory: u64,
    pub cores: u32,
    pub disk_path: &'a str,
    pub ip: &'a str,
}

/// A validated domain description template
#[derive(Debug, Clone)]
pub struct DomainTemplate {
    source: String,
}

impl DomainTemplate {
    /// Create a template, rejecting malformed placeholders up front
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let template = Self {
            source: source.into(),
        };

        template.render(&DomainParams {
            name: "validate",
            memory: 1,
            cores: 1,
            disk_path: "/dev/validate/validate",
            ip: "0.0.0.0",
        })?;

        Ok(template)
    }

    /// Load a template from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to load vm template {}: {}", path.display(), e))
        })?;
        Self::new(source)
    }

    /// Substitute `params` into the template
    ///
    /// # Errors
    ///
    /// `Template` if a placeholder is unterminated or names an unknown field.
    pub fn render(&self, params: &DomainParams<'_>) -> Result<String> {
        let mut out = String::with_capacity(self.source.len() + 64);
        let mut rest = self.source.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let end = after.find("}}").ok_or_else(|| {
                Error::template(format!(
                    "unterminated placeholder at byte {}",
                    self.source.len() - rest.len() + start
                ))
            })?;

            let field = after[..end].trim();
            let value = match field {
                ".Name" => escape(params.name).into_owned(),
                ".Memory" => params.memory.to_string(),
                ".Cores" => params.cores.to_string(),
                ".DiskPath" => escape(params.disk_path).into_owned(),
                ".IP" => escape(params.ip).into_owned(),
                other => {
                    return Err(Error::template(format!("unknown placeholder {{{{{}}}}}", other)));
                }
            };
            out.push_str(&value);
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }
}
