pub mod common;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use common::PacketComponent;
use enums::ResponseCode;
use header::DNSHeader;
use question::DNSQuestion;
use resource::DNSResource;
use tracing::trace;

/// Largest response sent over UDP without EDNS0
pub const MAX_UDP_PAYLOAD: usize = 512;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
}

#[derive(Debug)]
pub enum ParseError {
    InvalidHeader,
    InvalidLabel,
    InvalidQuestionSection,
    InvalidAnswerSection,
    InvalidAuthoritySection,
    InvalidAdditionalSection,
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidHeader => write!(f, "Invalid DNS header"),
            ParseError::InvalidLabel => write!(f, "Invalid DNS label"),
            ParseError::InvalidQuestionSection => write!(f, "Invalid question section"),
            ParseError::InvalidAnswerSection => write!(f, "Invalid answer section"),
            ParseError::InvalidAuthoritySection => write!(f, "Invalid authority section"),
            ParseError::InvalidAdditionalSection => write!(f, "Invalid additional section"),
            ParseError::InvalidBitStream(e) => write!(f, "Invalid bit stream: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

impl DNSPacket {
    /// Build a single-question query, mostly useful for tests and tooling
    pub fn query(id: u16, name: &str, qtype: enums::DNSResourceType) -> Self {
        let mut packet = DNSPacket::default();
        packet.header.id = id;
        packet.header.rd = true;
        packet.header.qdcount = 1;
        packet.questions.push(DNSQuestion::new(name, qtype));
        packet
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        let mut reader = BitReader::<_, BigEndian>::new(buf);
        let mut packet = DNSPacket::default();
        packet
            .header
            .read(&mut reader)
            .map_err(|_| ParseError::InvalidHeader)?;

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader).map_err(|e| match e {
                ParseError::InvalidLabel => ParseError::InvalidLabel,
                _ => ParseError::InvalidQuestionSection,
            })?;
            packet.questions.push(question);
        }

        for _ in 0..packet.header.ancount {
            let mut answer = DNSResource::default();
            answer
                .read(&mut reader)
                .map_err(|_| ParseError::InvalidAnswerSection)?;
            packet.answers.push(answer);
        }

        for _ in 0..packet.header.nscount {
            let mut authority = DNSResource::default();
            authority
                .read(&mut reader)
                .map_err(|_| ParseError::InvalidAuthoritySection)?;
            packet.authorities.push(authority);
        }

        for _ in 0..packet.header.arcount {
            let mut resource = DNSResource::default();
            resource
                .read(&mut reader)
                .map_err(|_| ParseError::InvalidAdditionalSection)?;
            packet.resources.push(resource);
        }

        Ok(packet)
    }

    /// Serialize the packet. Section counts are taken from the section vectors,
    /// not from the header.
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        let mut header = self.header.clone();
        header.qdcount = section_count(self.questions.len())?;
        header.ancount = section_count(self.answers.len())?;
        header.nscount = section_count(self.authorities.len())?;
        header.arcount = section_count(self.resources.len())?;
        header.write(&mut writer)?;

        for question in self.questions.iter() {
            question.write(&mut writer)?;
        }

        for answer in self.answers.iter() {
            answer.write(&mut writer)?;
        }

        for authority in self.authorities.iter() {
            authority.write(&mut writer)?;
        }

        for resource in self.resources.iter() {
            resource.write(&mut writer)?;
        }

        Ok(buf)
    }

    /// Serialize for a UDP reply. Responses over [`MAX_UDP_PAYLOAD`] are sent
    /// as [`DNSPacket::truncated`] so the client retries over TCP.
    pub fn serialize_udp(&self) -> Result<Vec<u8>, ParseError> {
        let bytes = self.serialize()?;
        if bytes.len() <= MAX_UDP_PAYLOAD {
            return Ok(bytes);
        }
        trace!("Response of {} bytes truncated", bytes.len());
        self.truncated().serialize()
    }

    /// Copy with the TC bit set and every record section emptied
    pub fn truncated(&self) -> Self {
        let mut packet = DNSPacket {
            header: self.header.clone(),
            questions: self.questions.clone(),
            ..Default::default()
        };
        packet.header.tc = true;
        packet.header.ancount = 0;
        packet.header.nscount = 0;
        packet.header.arcount = 0;
        packet
    }

    /// Empty response to this query with the id, opcode, RD bit and questions echoed
    pub fn response(&self, rcode: ResponseCode) -> Self {
        let mut header = DNSHeader {
            id: self.header.id,
            qr: true,
            opcode: self.header.opcode,
            rd: self.header.rd,
            rcode: rcode as u8,
            ..Default::default()
        };
        header.qdcount = self.questions.len() as u16;

        DNSPacket {
            header,
            questions: self.questions.clone(),
            ..Default::default()
        }
    }

    /// Authoritative NOERROR response carrying `answers`
    pub fn authoritative_answer(&self, answers: Vec<DNSResource>) -> Self {
        let mut packet = self.response(ResponseCode::NoError);
        packet.header.aa = true;
        packet.header.ancount = answers.len() as u16;
        packet.answers = answers;
        packet
    }

    pub fn rcode(&self) -> u8 {
        self.header.rcode
    }
}

fn section_count(len: usize) -> Result<u16, ParseError> {
    u16::try_from(len)
        .map_err(|_| ParseError::InvalidBitStream(format!("Too many records in section: {}", len)))
}
