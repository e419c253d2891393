//! Rewrap PKCS#1 and SEC1 private keys as PKCS#8
//!
//! kubeadm, `openssl genrsa -traditional` and `openssl ecparam -genkey`
//! write `RSA PRIVATE KEY` and `EC PRIVATE KEY` blocks, while the signer
//! only accepts `PRIVATE KEY`.

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_EC_PARAMETERS: u8 = 0xa0;

/// 1.2.840.113549.1.1.1
const OID_RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
/// 1.2.840.10045.2.1
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];

fn encode_len(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    encode_len(content.len(), &mut out);
    out.extend_from_slice(content);
    out
}

/// Split one element off `input`: (tag, whole element, content, rest)
fn read_tlv(input: &[u8]) -> Option<(u8, &[u8], &[u8], &[u8])> {
    let (&tag, rest) = input.split_first()?;
    let (&first, rest) = rest.split_first()?;
    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() || rest.len() < count {
            return None;
        }
        let len = rest[..count].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[count..])
    };
    if rest.len() < len {
        return None;
    }
    let header = input.len() - rest.len();
    Some((tag, &input[..header + len], &rest[..len], &rest[len..]))
}

fn private_key_info(algorithm: &[u8], key: &[u8]) -> Vec<u8> {
    let mut body = tlv(TAG_INTEGER, &[0]);
    body.extend(tlv(TAG_SEQUENCE, algorithm));
    body.extend(tlv(TAG_OCTET_STRING, key));
    tlv(TAG_SEQUENCE, &body)
}

/// Wrap an `RSAPrivateKey`
pub(crate) fn from_pkcs1(der: &[u8]) -> Vec<u8> {
    let mut algorithm = tlv(TAG_OID, OID_RSA_ENCRYPTION);
    algorithm.extend(tlv(TAG_NULL, &[]));
    private_key_info(&algorithm, der)
}

/// Wrap an `ECPrivateKey`, taking the curve from its parameters
pub(crate) fn from_sec1(der: &[u8]) -> Result<Vec<u8>, String> {
    let malformed = || "malformed EC private key".to_string();
    let (tag, _, body, _) = read_tlv(der).ok_or_else(malformed)?;
    if tag != TAG_SEQUENCE {
        return Err(malformed());
    }
    let (_, _, _, body) = read_tlv(body).filter(|t| t.0 == TAG_INTEGER).ok_or_else(malformed)?;
    let (_, _, _, body) = read_tlv(body).filter(|t| t.0 == TAG_OCTET_STRING).ok_or_else(malformed)?;
    let curve = match read_tlv(body) {
        Some((TAG_EC_PARAMETERS, _, params, _)) => read_tlv(params)
            .filter(|t| t.0 == TAG_OID)
            .map(|t| t.1)
            .ok_or_else(malformed)?,
        _ => return Err("EC private key does not name its curve".to_string()),
    };

    let mut algorithm = tlv(TAG_OID, OID_EC_PUBLIC_KEY);
    algorithm.extend_from_slice(curve);
    Ok(private_key_info(&algorithm, der))
}

/// PKCS#8 DER for a PEM private key block
pub(crate) fn normalize(label: &str, contents: &[u8]) -> Result<Vec<u8>, String> {
    match label {
        "PRIVATE KEY" => Ok(contents.to_vec()),
        "RSA PRIVATE KEY" => Ok(from_pkcs1(contents)),
        "EC PRIVATE KEY" => from_sec1(contents),
        other => Err(format!("unsupported private key block \"{}\"", other)),
    }
}
