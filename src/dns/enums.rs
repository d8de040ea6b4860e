use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DNSResourceType {
    #[default]
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    CAA,
    AXFR,
    ANY,
    Unknown(u16),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DNSResourceClass {
    #[default]
    IN,
    CS,
    CH,
    HS,
    Unknown(u16),
}

/// Response codes from RFC 1035 section 4.1.1
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    NoError = 0,
    FormatError = 1,
    ServerFailure = 2,
    NameError = 3,
    NotImplemented = 4,
    Refused = 5,
}

impl From<u16> for DNSResourceClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceClass::IN,
            2 => DNSResourceClass::CS,
            3 => DNSResourceClass::CH,
            4 => DNSResourceClass::HS,
            x => DNSResourceClass::Unknown(x),
        }
    }
}

impl From<DNSResourceClass> for u16 {
    fn from(value: DNSResourceClass) -> Self {
        match value {
            DNSResourceClass::IN => 1,
            DNSResourceClass::CS => 2,
            DNSResourceClass::CH => 3,
            DNSResourceClass::HS => 4,
            DNSResourceClass::Unknown(x) => x,
        }
    }
}

impl From<u16> for DNSResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            33 => DNSResourceType::SRV,
            252 => DNSResourceType::AXFR,
            255 => DNSResourceType::ANY,
            257 => DNSResourceType::CAA,
            x => DNSResourceType::Unknown(x),
        }
    }
}

impl From<DNSResourceType> for u16 {
    fn from(value: DNSResourceType) -> Self {
        match value {
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::SRV => 33,
            DNSResourceType::AXFR => 252,
            DNSResourceType::ANY => 255,
            DNSResourceType::CAA => 257,
            DNSResourceType::Unknown(x) => x,
        }
    }
}

impl fmt::Display for DNSResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceType::A => write!(f, "A"),
            DNSResourceType::NS => write!(f, "NS"),
            DNSResourceType::CNAME => write!(f, "CNAME"),
            DNSResourceType::SOA => write!(f, "SOA"),
            DNSResourceType::PTR => write!(f, "PTR"),
            DNSResourceType::MX => write!(f, "MX"),
            DNSResourceType::TXT => write!(f, "TXT"),
            DNSResourceType::AAAA => write!(f, "AAAA"),
            DNSResourceType::SRV => write!(f, "SRV"),
            DNSResourceType::CAA => write!(f, "CAA"),
            DNSResourceType::AXFR => write!(f, "AXFR"),
            DNSResourceType::ANY => write!(f, "ANY"),
            // RFC 3597 generic type notation
            DNSResourceType::Unknown(x) => write!(f, "TYPE{}", x),
        }
    }
}

impl FromStr for DNSResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "A" => Ok(DNSResourceType::A),
            "NS" => Ok(DNSResourceType::NS),
            "CNAME" => Ok(DNSResourceType::CNAME),
            "SOA" => Ok(DNSResourceType::SOA),
            "PTR" => Ok(DNSResourceType::PTR),
            "MX" => Ok(DNSResourceType::MX),
            "TXT" => Ok(DNSResourceType::TXT),
            "AAAA" => Ok(DNSResourceType::AAAA),
            "SRV" => Ok(DNSResourceType::SRV),
            "CAA" => Ok(DNSResourceType::CAA),
            "AXFR" => Ok(DNSResourceType::AXFR),
            "ANY" => Ok(DNSResourceType::ANY),
            other => other
                .strip_prefix("TYPE")
                .and_then(|n| n.parse::<u16>().ok())
                .map(DNSResourceType::from)
                .ok_or_else(|| format!("Unknown record type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_parse_case_insensitively() {
        assert_eq!("aaaa".parse::<DNSResourceType>(), Ok(DNSResourceType::AAAA));
        assert_eq!(" MX ".parse::<DNSResourceType>(), Ok(DNSResourceType::MX));
        assert_eq!("TYPE99".parse::<DNSResourceType>(), Ok(DNSResourceType::Unknown(99)));
        assert!("BOGUS".parse::<DNSResourceType>().is_err());
    }

    #[test]
    fn test_unknown_type_keeps_its_code() {
        let rtype = DNSResourceType::from(65280);
        assert_eq!(rtype, DNSResourceType::Unknown(65280));
        assert_eq!(u16::from(rtype), 65280);
        assert_eq!(rtype.to_string(), "TYPE65280");
    }
}
