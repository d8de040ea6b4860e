use crate::dns::common::MAX_LABEL_LENGTH;
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::resource::DNSResource;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Owner name used for the zone apex
pub const APEX: &str = "@";

/// A single record row as stored in the records table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Zone the record belongs to, as stored
    pub zone: String,
    /// Owner name relative to the zone, `@` for the apex
    pub name: String,
    /// Record type
    pub rtype: DNSResourceType,
    /// Stored TTL, `None` or zero means "use the configured default"
    pub ttl: Option<u32>,
    /// Type specific data
    pub content: RecordContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxContent {
    pub host: String,
    pub preference: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvContent {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaContent {
    pub ns: String,
    #[serde(rename = "MBox", alias = "mbox")]
    pub mbox: String,
    #[serde(default)]
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaaContent {
    pub flag: u8,
    pub tag: String,
    pub value: String,
}

#[derive(Deserialize)]
struct IpContent<T> {
    ip: T,
}

#[derive(Deserialize)]
struct HostContent {
    host: String,
}

#[derive(Deserialize)]
struct TextContent {
    text: String,
}

/// Record data, decoded from the JSON `content` column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordContent {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(String),
    NS(String),
    PTR(String),
    MX(MxContent),
    TXT(String),
    SRV(SrvContent),
    SOA(SoaContent),
    CAA(CaaContent),
}

impl RecordContent {
    /// Decode the `content` column for a row of type `rtype`
    pub fn from_json(rtype: DNSResourceType, json: &str) -> Result<Self, String> {
        let decoded = match rtype {
            DNSResourceType::A => serde_json::from_str::<IpContent<Ipv4Addr>>(json)
                .map(|c| RecordContent::A(c.ip)),
            DNSResourceType::AAAA => serde_json::from_str::<IpContent<Ipv6Addr>>(json)
                .map(|c| RecordContent::AAAA(c.ip)),
            DNSResourceType::CNAME => {
                serde_json::from_str::<HostContent>(json).map(|c| RecordContent::CNAME(c.host))
            }
            DNSResourceType::NS => {
                serde_json::from_str::<HostContent>(json).map(|c| RecordContent::NS(c.host))
            }
            DNSResourceType::PTR => {
                serde_json::from_str::<HostContent>(json).map(|c| RecordContent::PTR(c.host))
            }
            DNSResourceType::MX => serde_json::from_str(json).map(RecordContent::MX),
            DNSResourceType::TXT => {
                serde_json::from_str::<TextContent>(json).map(|c| RecordContent::TXT(c.text))
            }
            DNSResourceType::SRV => serde_json::from_str(json).map(RecordContent::SRV),
            DNSResourceType::SOA => serde_json::from_str(json).map(RecordContent::SOA),
            DNSResourceType::CAA => serde_json::from_str(json).map(RecordContent::CAA),
            other => return Err(format!("Unsupported record type: {}", other)),
        };

        decoded.map_err(|e| format!("Invalid {} content {}: {}", rtype, json, e))
    }

    /// The record type this content belongs to
    pub fn rtype(&self) -> DNSResourceType {
        match self {
            RecordContent::A(_) => DNSResourceType::A,
            RecordContent::AAAA(_) => DNSResourceType::AAAA,
            RecordContent::CNAME(_) => DNSResourceType::CNAME,
            RecordContent::NS(_) => DNSResourceType::NS,
            RecordContent::PTR(_) => DNSResourceType::PTR,
            RecordContent::MX(_) => DNSResourceType::MX,
            RecordContent::TXT(_) => DNSResourceType::TXT,
            RecordContent::SRV(_) => DNSResourceType::SRV,
            RecordContent::SOA(_) => DNSResourceType::SOA,
            RecordContent::CAA(_) => DNSResourceType::CAA,
        }
    }

    /// Encode to wire-format RDATA
    pub fn to_rdata(&self) -> Result<Vec<u8>, String> {
        let mut rdata = Vec::new();
        match self {
            RecordContent::A(addr) => rdata.extend_from_slice(&addr.octets()),
            RecordContent::AAAA(addr) => rdata.extend_from_slice(&addr.octets()),
            RecordContent::CNAME(host) | RecordContent::NS(host) | RecordContent::PTR(host) => {
                encode_domain_name(host, &mut rdata)?
            }
            RecordContent::MX(mx) => {
                rdata.extend_from_slice(&mx.preference.to_be_bytes());
                encode_domain_name(&mx.host, &mut rdata)?;
            }
            RecordContent::TXT(text) => {
                // Character strings are at most 255 bytes each
                if text.is_empty() {
                    rdata.push(0);
                }
                for chunk in text.as_bytes().chunks(255) {
                    rdata.push(chunk.len() as u8);
                    rdata.extend_from_slice(chunk);
                }
            }
            RecordContent::SRV(srv) => {
                rdata.extend_from_slice(&srv.priority.to_be_bytes());
                rdata.extend_from_slice(&srv.weight.to_be_bytes());
                rdata.extend_from_slice(&srv.port.to_be_bytes());
                encode_domain_name(&srv.target, &mut rdata)?;
            }
            RecordContent::SOA(soa) => {
                encode_domain_name(&soa.ns, &mut rdata)?;
                encode_domain_name(&soa.mbox, &mut rdata)?;
                for value in [soa.serial, soa.refresh, soa.retry, soa.expire, soa.minttl] {
                    rdata.extend_from_slice(&value.to_be_bytes());
                }
            }
            RecordContent::CAA(caa) => {
                if caa.tag.is_empty() || caa.tag.len() > 255 {
                    return Err(format!("Invalid CAA tag length: {}", caa.tag.len()));
                }
                rdata.push(caa.flag);
                rdata.push(caa.tag.len() as u8);
                rdata.extend_from_slice(caa.tag.as_bytes());
                rdata.extend_from_slice(caa.value.as_bytes());
            }
        }
        Ok(rdata)
    }
}

impl Record {
    pub fn new(zone: &str, name: &str, ttl: Option<u32>, content: RecordContent) -> Self {
        Self {
            zone: zone.to_string(),
            name: name.to_string(),
            rtype: content.rtype(),
            ttl,
            content,
        }
    }

    /// TTL to serve: the stored one unless it is unset or zero
    pub fn effective_ttl(&self, default_ttl: u32) -> u32 {
        resolve_ttl(self.ttl, default_ttl)
    }

    /// Fully qualified owner name without the trailing dot
    pub fn fqdn(&self) -> String {
        let origin = self.zone.trim_end_matches('.');
        let name = self.name.trim();

        if name == APEX || name.is_empty() {
            origin.to_string()
        } else if name.ends_with('.') {
            name.trim_end_matches('.').to_string()
        } else if origin.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", name, origin)
        }
    }

    /// Convert to an answer record owned by `owner`
    pub fn to_dns_resource(&self, owner: &[String], default_ttl: u32) -> Result<DNSResource, String> {
        Ok(DNSResource {
            labels: owner.to_vec(),
            rtype: self.rtype,
            rclass: DNSResourceClass::IN,
            ttl: self.effective_ttl(default_ttl),
            rdata: self.content.to_rdata()?,
        })
    }
}

/// Apply the configured default to an unset or zero TTL
pub fn resolve_ttl(stored: Option<u32>, default_ttl: u32) -> u32 {
    match stored {
        Some(ttl) if ttl > 0 => ttl,
        _ => default_ttl,
    }
}

/// Encode a domain name to uncompressed wire format
fn encode_domain_name(name: &str, out: &mut Vec<u8>) -> Result<(), String> {
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() {
            continue;
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(format!("Label too long: {}", label));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }

    out.push(0);
    Ok(())
}
