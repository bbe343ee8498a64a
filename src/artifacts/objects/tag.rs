//! Annotated tag object
//!
//! ```text
//! tag <size>\0
//! object <target-oid>
//! type <target-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <message>
//! ```
//!
//! The `tagger` line is optional (very old tags were written without one).

use crate::artifacts::objects::commit::{expect_header, header_str, parse_headers};
use crate::artifacts::objects::hash::HashAlgorithm;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    #[new(into)]
    name: String,
    tagger: Option<Signature>,
    #[new(into)]
    message: Bytes,
}

impl Tag {
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> Option<&Signature> {
        self.tagger.as_ref()
    }

    pub fn message(&self) -> &Bytes {
        &self.message
    }
}

impl Packable for Tag {
    fn serialize(&self) -> Result<Bytes> {
        if self.name.is_empty() || self.name.contains('\n') {
            return Err(Error::InvalidArgument(format!(
                "invalid tag name '{}'",
                self.name.escape_debug()
            )));
        }

        let mut content = format!(
            "object {}\ntype {}\ntag {}\n",
            self.target, self.target_type, self.name
        );
        if let Some(tagger) = &self.tagger {
            content.push_str(&format!("tagger {}\n", tagger.display()));
        }
        content.push('\n');

        let mut content = content.into_bytes();
        content.extend_from_slice(&self.message);

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Tag {
    fn deserialize(data: Bytes, algorithm: HashAlgorithm) -> Result<Self> {
        let (headers, message) = parse_headers(&data)?;
        let mut headers = headers.into_iter();

        let target = expect_header(&mut headers, "tag", "object")?;
        let target = ObjectId::try_parse_for(header_str("object", &target)?, algorithm)?;
        let target_type = expect_header(&mut headers, "tag", "type")?;
        let target_type = ObjectType::try_from(header_str("type", &target_type)?)?;
        let name = expect_header(&mut headers, "tag", "tag")?;
        let name = header_str("tag", &name)?.to_string();

        let tagger = match headers.next() {
            Some((header, value)) if header == "tagger" => {
                Some(Signature::try_from(header_str("tagger", &value)?)?)
            }
            Some((header, _)) => {
                return Err(Error::malformed(format!("unexpected tag header '{header}'")));
            }
            None => None,
        };
        if let Some((header, _)) = headers.next() {
            return Err(Error::malformed(format!("unexpected tag header '{header}'")));
        }

        Ok(Tag {
            target,
            target_type,
            name,
            tagger,
            message,
        })
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }
}
