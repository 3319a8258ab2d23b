//! ICC profile identification
//!
//! Reads the tag table of an embedded ICC profile and returns the profile
//! name and description the way littlecms based tools present them.

/// Name and description of an ICC profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IccIdentity {
    pub name: String,
    pub description: String,
}

const HEADER_SIZE: usize = 128;
const MAX_MODEL_LEN: usize = 30;

/// Identify a profile, or `None` when the bytes are not a readable profile.
pub fn identify(profile: &[u8]) -> Option<IccIdentity> {
    if profile.len() < HEADER_SIZE + 4 || &profile[36..40] != b"acsp" {
        return None;
    }

    let description = read_text_tag(profile, b"desc").unwrap_or_default();
    let model = read_text_tag(profile, b"dmdd").unwrap_or_default();
    let manufacturer = read_text_tag(profile, b"dmnd").unwrap_or_default();

    let name = if model.is_empty() && manufacturer.is_empty() {
        description.clone()
    } else if manufacturer.is_empty() || model.chars().count() > MAX_MODEL_LEN {
        model
    } else {
        format!("{} - {}", model, manufacturer)
    };

    Some(IccIdentity {
        name: name.trim().to_string(),
        description: description.trim().to_string(),
    })
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn find_tag<'a>(profile: &'a [u8], signature: &[u8; 4]) -> Option<&'a [u8]> {
    let count = read_u32(profile, HEADER_SIZE)? as usize;
    for idx in 0..count {
        let entry = HEADER_SIZE + 4 + idx * 12;
        let sig = profile.get(entry..entry + 4)?;
        if sig == signature {
            let offset = read_u32(profile, entry + 4)? as usize;
            let size = read_u32(profile, entry + 8)? as usize;
            return profile.get(offset..offset.checked_add(size)?);
        }
    }
    None
}

fn read_text_tag(profile: &[u8], signature: &[u8; 4]) -> Option<String> {
    let tag = find_tag(profile, signature)?;
    match tag.get(0..4)? {
        // ICC v2 textDescriptionType: ASCII count then NUL terminated text
        b"desc" => {
            let count = read_u32(tag, 8)? as usize;
            let text = tag.get(12..12 + count)?;
            let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
            Some(String::from_utf8_lossy(&text[..end]).into_owned())
        }
        // ICC v4 multiLocalizedUnicodeType: first record wins
        b"mluc" => {
            let records = read_u32(tag, 8)?;
            if records == 0 {
                return None;
            }
            let length = read_u32(tag, 20)? as usize;
            let offset = read_u32(tag, 24)? as usize;
            let raw = tag.get(offset..offset + length)?;
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units).trim_end_matches('\0').to_string())
        }
        b"text" => {
            let text = tag.get(8..)?;
            let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
            Some(String::from_utf8_lossy(&text[..end]).into_owned())
        }
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn desc_tag(text: &str) -> Vec<u8> {
        let mut tag = b"desc\0\0\0\0".to_vec();
        tag.extend_from_slice(&((text.len() + 1) as u32).to_be_bytes());
        tag.extend_from_slice(text.as_bytes());
        tag.push(0);
        tag
    }

    fn mluc_tag(text: &str) -> Vec<u8> {
        let utf16: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        let mut tag = b"mluc\0\0\0\0".to_vec();
        tag.extend_from_slice(&1u32.to_be_bytes());
        tag.extend_from_slice(&12u32.to_be_bytes());
        tag.extend_from_slice(b"enUS");
        tag.extend_from_slice(&(utf16.len() as u32).to_be_bytes());
        tag.extend_from_slice(&28u32.to_be_bytes());
        tag.extend_from_slice(&utf16);
        tag
    }

    /// Build a minimal profile carrying the given tags.
    pub(crate) fn build_profile(tags: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut profile = vec![0u8; HEADER_SIZE];
        profile[36..40].copy_from_slice(b"acsp");
        profile.extend_from_slice(&(tags.len() as u32).to_be_bytes());

        let mut offset = HEADER_SIZE + 4 + tags.len() * 12;
        let mut body = Vec::new();
        for (sig, data) in tags {
            profile.extend_from_slice(*sig);
            profile.extend_from_slice(&(offset as u32).to_be_bytes());
            profile.extend_from_slice(&(data.len() as u32).to_be_bytes());
            body.extend_from_slice(data);
            offset += data.len();
        }
        profile.extend(body);
        profile
    }

    pub(crate) fn srgb_profile() -> Vec<u8> {
        build_profile(&[(b"desc", desc_tag("sRGB IEC61966-2.1"))])
    }

    #[test]
    fn test_v2_description_only() {
        let identity = identify(&srgb_profile()).unwrap();
        assert_eq!(identity.name, "sRGB IEC61966-2.1");
        assert_eq!(identity.description, "sRGB IEC61966-2.1");
    }

    #[test]
    fn test_model_and_manufacturer_form_name() {
        let profile = build_profile(&[
            (b"desc", mluc_tag("Display P3")),
            (b"dmdd", desc_tag("Studio Display")),
            (b"dmnd", desc_tag("Acme")),
        ]);
        let identity = identify(&profile).unwrap();
        assert_eq!(identity.name, "Studio Display - Acme");
        assert_eq!(identity.description, "Display P3");
    }

    #[test]
    fn test_garbage_is_not_a_profile() {
        assert!(identify(b"not an icc profile").is_none());
        assert!(identify(&vec![0u8; 200]).is_none());
    }
}
