//! ABI Method Codec
//!
//! A method call is `method_id (4 bytes) || packed_args`. The id is the
//! first four bytes of keccak256 over the method's canonical signature
//! string. Argument packing uses 32-byte words: fixed-size values are
//! right-aligned in one word; `bytes` arguments are an offset word into a
//! tail holding a length word plus right-padded data.
//!
//! The codec is canonical and signable: `unpack(pack(m, args)) == args`,
//! and two implementations packing the same call MUST produce identical
//! bytes.

use sha3::{Digest, Keccak256};
use thiserror::Error;

use lib_types::{Address, TokenTag, ADDRESS_LEN, TOKEN_TAG_LEN};

/// Length of a method id
pub const METHOD_ID_LEN: usize = 4;

/// Width of one ABI word
const WORD: usize = 32;

/// ABI codec failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// Calldata carries an id no method table entry matches
    #[error("method not found: 0x{}", hex::encode(.0))]
    MethodNotFound([u8; 4]),

    /// A name lookup missed the method table
    #[error("unknown method name: {0}")]
    UnknownMethodName(String),

    /// Calldata ends before the declared arguments do
    #[error("calldata truncated")]
    Truncated,

    /// Caller supplied the wrong number of arguments
    #[error("argument count mismatch: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    /// Caller supplied a value of the wrong kind
    #[error("argument type mismatch: expected {expected:?}")]
    TypeMismatch { expected: ParamKind },

    /// A word violates the canonical layout (non-zero padding, oversized
    /// integer, out-of-range offset)
    #[error("malformed calldata: {0}")]
    Malformed(&'static str),
}

/// Declared kind of one method parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// 21-byte account address
    Address,
    /// 10-byte token tag
    Token,
    /// Unsigned integer up to 128 bits, carried in a uint256 word
    Uint256,
    /// Dynamic byte string
    Bytes,
}

/// A decoded or to-be-packed argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Token(TokenTag),
    Uint(u128),
    Bytes(Vec<u8>),
}

impl AbiValue {
    pub fn as_address(&self) -> Option<Address> {
        match self {
            AbiValue::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<TokenTag> {
        match self {
            AbiValue::Token(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u128> {
        match self {
            AbiValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AbiValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    fn kind(&self) -> ParamKind {
        match self {
            AbiValue::Address(_) => ParamKind::Address,
            AbiValue::Token(_) => ParamKind::Token,
            AbiValue::Uint(_) => ParamKind::Uint256,
            AbiValue::Bytes(_) => ParamKind::Bytes,
        }
    }
}

/// First four bytes of keccak256 over the canonical signature string
pub fn method_id(signature: &str) -> [u8; METHOD_ID_LEN] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut id = [0u8; METHOD_ID_LEN];
    id.copy_from_slice(&digest[..METHOD_ID_LEN]);
    id
}

/// One entry of a contract's method table
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    /// Short name used by callers
    pub name: &'static str,
    /// Canonical signature string the id derives from
    pub signature: &'static str,
    /// `keccak256(signature)[..4]`
    pub id: [u8; METHOD_ID_LEN],
    /// Declared parameter kinds, in order
    pub params: &'static [ParamKind],
}

impl Method {
    fn new(name: &'static str, signature: &'static str, params: &'static [ParamKind]) -> Self {
        Self {
            name,
            signature,
            id: method_id(signature),
            params,
        }
    }

    fn pack_args(&self, args: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
        if args.len() != self.params.len() {
            return Err(AbiError::ArityMismatch {
                expected: self.params.len(),
                got: args.len(),
            });
        }
        let head_len = self.params.len() * WORD;
        let mut head = Vec::with_capacity(head_len);
        let mut tail: Vec<u8> = Vec::new();

        for (param, value) in self.params.iter().zip(args) {
            if *param != value.kind() {
                return Err(AbiError::TypeMismatch { expected: *param });
            }
            match value {
                AbiValue::Address(a) => head.extend_from_slice(&right_aligned(a.as_bytes())),
                AbiValue::Token(t) => head.extend_from_slice(&right_aligned(t.as_bytes())),
                AbiValue::Uint(v) => head.extend_from_slice(&uint_word(*v)),
                AbiValue::Bytes(b) => {
                    let offset = head_len + tail.len();
                    head.extend_from_slice(&uint_word(offset as u128));
                    tail.extend_from_slice(&uint_word(b.len() as u128));
                    tail.extend_from_slice(b);
                    // right-pad the data to a word boundary
                    let rem = b.len() % WORD;
                    if rem != 0 {
                        tail.extend_from_slice(&vec![0u8; WORD - rem]);
                    }
                }
            }
        }
        head.extend_from_slice(&tail);
        Ok(head)
    }

    fn unpack_args(&self, args: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        let mut values = Vec::with_capacity(self.params.len());
        for (i, param) in self.params.iter().enumerate() {
            let word = word_at(args, i * WORD)?;
            let value = match param {
                ParamKind::Address => {
                    require_zero(&word[..WORD - ADDRESS_LEN], "address padding")?;
                    let addr = Address::from_slice(&word[WORD - ADDRESS_LEN..])
                        .ok_or(AbiError::Malformed("address width"))?;
                    AbiValue::Address(addr)
                }
                ParamKind::Token => {
                    require_zero(&word[..WORD - TOKEN_TAG_LEN], "token padding")?;
                    let tag = TokenTag::from_slice(&word[WORD - TOKEN_TAG_LEN..])
                        .ok_or(AbiError::Malformed("token width"))?;
                    AbiValue::Token(tag)
                }
                ParamKind::Uint256 => AbiValue::Uint(uint_from_word(&word)?),
                ParamKind::Bytes => {
                    let offset = usize::try_from(uint_from_word(&word)?)
                        .map_err(|_| AbiError::Truncated)?;
                    let len_word = word_at(args, offset)?;
                    let len = usize::try_from(uint_from_word(&len_word)?)
                        .map_err(|_| AbiError::Truncated)?;
                    let start = offset + WORD;
                    let end = start.checked_add(len).ok_or(AbiError::Truncated)?;
                    if end > args.len() {
                        return Err(AbiError::Truncated);
                    }
                    AbiValue::Bytes(args[start..end].to_vec())
                }
            };
            values.push(value);
        }
        Ok(values)
    }
}

fn right_aligned(bytes: &[u8]) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - bytes.len()..].copy_from_slice(bytes);
    word
}

fn uint_word(v: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 16..].copy_from_slice(&v.to_be_bytes());
    word
}

fn uint_from_word(word: &[u8; WORD]) -> Result<u128, AbiError> {
    require_zero(&word[..WORD - 16], "uint256 exceeds 128 bits")?;
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&word[WORD - 16..]);
    Ok(u128::from_be_bytes(raw))
}

fn require_zero(bytes: &[u8], what: &'static str) -> Result<(), AbiError> {
    if bytes.iter().any(|&b| b != 0) {
        return Err(AbiError::Malformed(what));
    }
    Ok(())
}

fn word_at(args: &[u8], offset: usize) -> Result<[u8; WORD], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Truncated)?;
    if end > args.len() {
        return Err(AbiError::Truncated);
    }
    let mut word = [0u8; WORD];
    word.copy_from_slice(&args[offset..end]);
    Ok(word)
}

/// A contract's method table
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    methods: Vec<Method>,
}

impl ContractAbi {
    /// Build a table from `(name, signature, params)` triples
    pub fn new(entries: &[(&'static str, &'static str, &'static [ParamKind])]) -> Self {
        let methods = entries
            .iter()
            .map(|(name, signature, params)| Method::new(name, signature, params))
            .collect();
        Self { methods }
    }

    /// Look up a method by caller-facing name
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Look up a method by wire id
    pub fn method_by_id(&self, id: &[u8; METHOD_ID_LEN]) -> Option<&Method> {
        self.methods.iter().find(|m| &m.id == id)
    }

    /// Encode a call: `id || packed_args`
    pub fn pack(&self, name: &str, args: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
        let method = self
            .method(name)
            .ok_or_else(|| AbiError::UnknownMethodName(name.to_string()))?;
        let mut out = Vec::with_capacity(METHOD_ID_LEN + args.len() * WORD);
        out.extend_from_slice(&method.id);
        out.extend_from_slice(&method.pack_args(args)?);
        Ok(out)
    }

    /// Decode a call by its wire id
    pub fn unpack(&self, data: &[u8]) -> Result<(&Method, Vec<AbiValue>), AbiError> {
        if data.len() < METHOD_ID_LEN {
            return Err(AbiError::Truncated);
        }
        let mut id = [0u8; METHOD_ID_LEN];
        id.copy_from_slice(&data[..METHOD_ID_LEN]);
        let method = self.method_by_id(&id).ok_or(AbiError::MethodNotFound(id))?;
        let values = method.unpack_args(&data[METHOD_ID_LEN..])?;
        Ok((method, values))
    }

    /// Decode a call that must target the named method
    pub fn unpack_method(&self, name: &str, data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        let method = self
            .method(name)
            .ok_or_else(|| AbiError::UnknownMethodName(name.to_string()))?;
        if data.len() < METHOD_ID_LEN {
            return Err(AbiError::Truncated);
        }
        if data[..METHOD_ID_LEN] != method.id {
            let mut id = [0u8; METHOD_ID_LEN];
            id.copy_from_slice(&data[..METHOD_ID_LEN]);
            return Err(AbiError::MethodNotFound(id));
        }
        method.unpack_args(&data[METHOD_ID_LEN..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_PARAMS: &[ParamKind] =
        &[ParamKind::Address, ParamKind::Token, ParamKind::Uint256];
    const PAYLOAD_PARAMS: &[ParamKind] = &[ParamKind::Bytes];

    fn test_abi() -> ContractAbi {
        ContractAbi::new(&[
            ("Transfer", "Test.Transfer(address,token,uint256)", TRANSFER_PARAMS),
            ("Payload", "Test.Payload(bytes)", PAYLOAD_PARAMS),
        ])
    }

    #[test]
    fn test_method_id_is_keccak_prefix() {
        let digest = Keccak256::digest(b"Test.Transfer(address,token,uint256)");
        let abi = test_abi();
        assert_eq!(&abi.method("Transfer").unwrap().id[..], &digest[..4]);
    }

    #[test]
    fn test_static_args_roundtrip() {
        let abi = test_abi();
        let args = vec![
            AbiValue::Address(Address::new([7u8; ADDRESS_LEN])),
            AbiValue::Token(TokenTag::new(*b"VITE TOKEN")),
            AbiValue::Uint(3_000),
        ];
        let data = abi.pack("Transfer", &args).unwrap();
        assert_eq!(data.len(), 4 + 3 * 32);

        let (method, decoded) = abi.unpack(&data).unwrap();
        assert_eq!(method.name, "Transfer");
        assert_eq!(decoded, args);
    }

    #[test]
    fn test_bytes_arg_roundtrip() {
        let abi = test_abi();
        for len in [0usize, 1, 31, 32, 33, 100] {
            let payload = vec![0xabu8; len];
            let args = vec![AbiValue::Bytes(payload.clone())];
            let data = abi.pack("Payload", &args).unwrap();
            // data section is word-padded
            assert_eq!((data.len() - 4) % 32, 0);

            let decoded = abi.unpack_method("Payload", &data).unwrap();
            assert_eq!(decoded[0].as_bytes().unwrap(), &payload[..]);
        }
    }

    #[test]
    fn test_unknown_id_is_method_not_found() {
        let abi = test_abi();
        let data = [0xde, 0xad, 0xbe, 0xef, 0, 0];
        assert_eq!(
            abi.unpack(&data),
            Err(AbiError::MethodNotFound([0xde, 0xad, 0xbe, 0xef]))
        );
    }

    #[test]
    fn test_truncated_calldata() {
        let abi = test_abi();
        let args = vec![
            AbiValue::Address(Address::zero()),
            AbiValue::Token(TokenTag::zero()),
            AbiValue::Uint(1),
        ];
        let data = abi.pack("Transfer", &args).unwrap();
        assert_eq!(
            abi.unpack(&data[..data.len() - 1]),
            Err(AbiError::Truncated)
        );
        assert_eq!(abi.unpack(&data[..3]), Err(AbiError::Truncated));
    }

    #[test]
    fn test_nonzero_padding_rejected() {
        let abi = test_abi();
        let args = vec![
            AbiValue::Address(Address::zero()),
            AbiValue::Token(TokenTag::zero()),
            AbiValue::Uint(1),
        ];
        let mut data = abi.pack("Transfer", &args).unwrap();
        data[4] = 0xff; // corrupt address padding
        assert!(matches!(abi.unpack(&data), Err(AbiError::Malformed(_))));
    }

    #[test]
    fn test_pack_rejects_wrong_kinds() {
        let abi = test_abi();
        let err = abi
            .pack("Transfer", &[AbiValue::Uint(1), AbiValue::Uint(2), AbiValue::Uint(3)])
            .unwrap_err();
        assert_eq!(
            err,
            AbiError::TypeMismatch {
                expected: ParamKind::Address
            }
        );

        let err = abi.pack("Transfer", &[AbiValue::Uint(1)]).unwrap_err();
        assert_eq!(err, AbiError::ArityMismatch { expected: 3, got: 1 });
    }

    #[test]
    fn test_pack_is_deterministic() {
        let abi = test_abi();
        let args = vec![AbiValue::Bytes(vec![1, 2, 3])];
        assert_eq!(
            abi.pack("Payload", &args).unwrap(),
            abi.pack("Payload", &args).unwrap()
        );
    }
}
