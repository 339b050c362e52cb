use alloy_primitives::{Address, U256};
use anyhow::{Context, Result, anyhow, bail};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

// Every ABI value occupies at least one 32 byte word
pub const WORD_SIZE: usize = 32;
// 20 byte address, right-aligned in the word
pub const ADDRESS_LENGTH: usize = 20;
pub const ADDRESS_PADDING: usize = WORD_SIZE - ADDRESS_LENGTH;
// 64 / 8 bits = 8 bytes, right-aligned in the word
pub const BYTES_64_OFFSET: usize = WORD_SIZE - 8;
pub const DEFAULT_OFFSET: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    // Static value, encoded in place
    Word([u8; WORD_SIZE]),
    // Dynamic value, encoded in the tail (length word + right-padded data)
    Dynamic(Vec<u8>),
}

/// Solidity ABI argument buffer.
///
/// Built with the `add_*` methods and turned into call data with
/// [`Args::serialize`], or created from return data with [`Args::from_bytes`]
/// and consumed with the `next_*` methods.
#[derive(Debug, Clone, Default)]
pub struct Args {
    tokens: Vec<Token>,
    serialized: Vec<u8>,
    offset: usize, // For deserialization, always a head position
}

impl Args {
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            serialized: Vec::new(),
            offset: DEFAULT_OFFSET,
        }
    }

    /// Creates Args from existing encoded data, ready for deserialization.
    pub fn from_bytes(serialized: impl Into<Vec<u8>>) -> Self {
        Self {
            tokens: Vec::new(),
            serialized: serialized.into(),
            offset: DEFAULT_OFFSET,
        }
    }

    /// Returns the current deserialization offset.
    pub fn get_offset(&self) -> usize {
        self.offset
    }

    /// Number of values added so far.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Encodes the added values as head words followed by the dynamic tail.
    pub fn serialize(&self) -> Vec<u8> {
        let head_len = self.tokens.len() * WORD_SIZE;
        let mut head = Vec::with_capacity(head_len);
        let mut tail = Vec::new();

        for token in &self.tokens {
            match token {
                Token::Word(word) => head.extend_from_slice(word),
                Token::Dynamic(data) => {
                    head.extend_from_slice(&usize_word(head_len + tail.len()));
                    tail.extend_from_slice(&usize_word(data.len()));
                    tail.extend_from_slice(data);
                    tail.resize(tail.len() + padding_for(data.len()), 0);
                }
            }
        }

        head.extend_from_slice(&tail);
        head
    }

    // --- Internal Helper for Reading ---
    /// Reads one word at an absolute position without moving the head offset.
    fn word_at(&self, position: usize) -> Result<&[u8]> {
        let end = position.checked_add(WORD_SIZE).ok_or_else(|| {
            anyhow!("Offset overflow while reading a word at {}", position)
        })?;

        if end > self.serialized.len() {
            bail!(
                "Not enough bytes to read. Wanted a word at offset {}, but buffer length is {}",
                position,
                self.serialized.len()
            );
        }

        Ok(&self.serialized[position..end])
    }

    /// Reads the next head word and advances the offset.
    fn next_word(&mut self) -> Result<[u8; WORD_SIZE]> {
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(self.word_at(self.offset)?);
        self.offset += WORD_SIZE;
        Ok(word)
    }

    // --- Deserialization Methods (`next*`) ---

    /// Reads the next uint256.
    pub fn next_u256(&mut self) -> Result<U256> {
        let word = self.next_word().context("Failed to read u256")?;
        Ok(U256::from_be_bytes(word))
    }

    /// Reads the next uint64, rejecting words with high bits set.
    pub fn next_u64(&mut self) -> Result<u64> {
        let word = self.next_word().context("Failed to read u64")?;
        read_u64_word(&word)
    }

    /// Reads the next uint8, rejecting words with high bits set.
    pub fn next_u8(&mut self) -> Result<u8> {
        let value = self.next_u64().context("Failed to read u8")?;
        u8::try_from(value).map_err(|_| anyhow!("Value {} does not fit in a u8", value))
    }

    /// Reads the next boolean; only 0 and 1 are accepted.
    pub fn next_bool(&mut self) -> Result<bool> {
        match self.next_u64().context("Failed to read bool")? {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!("Invalid boolean word: {}", other),
        }
    }

    /// Reads the next address (20 bytes right-aligned in the word).
    pub fn next_address(&mut self) -> Result<Address> {
        let word = self.next_word().context("Failed to read address")?;
        if word[..ADDRESS_PADDING].iter().any(|byte| *byte != 0) {
            bail!("Address word has non-zero padding");
        }
        Ok(Address::from_slice(&word[ADDRESS_PADDING..]))
    }

    /// Reads the next dynamic byte string (offset word in the head, length and data in the tail).
    pub fn next_bytes(&mut self) -> Result<Vec<u8>> {
        let position = self.next_u64().context("Failed to read dynamic offset")? as usize;
        let len = read_u64_word(self.word_at(position).context("Failed to read dynamic length")?)?
            as usize;

        let start = position + WORD_SIZE;
        let end = start.checked_add(len).ok_or_else(|| {
            anyhow!("Length overflow while reading {} bytes from {}", len, start)
        })?;

        if end > self.serialized.len() {
            bail!(
                "Not enough bytes to read. Wanted {} bytes from offset {}, but buffer length is {}",
                len,
                start,
                self.serialized.len()
            );
        }

        Ok(self.serialized[start..end].to_vec())
    }

    /// Reads the next string (dynamic bytes decoded as UTF-8).
    pub fn next_string(&mut self) -> Result<String> {
        let bytes = self.next_bytes()?;
        let len = bytes.len();
        String::from_utf8(bytes)
            .with_context(|| format!("Failed to decode UTF-8 string with length {}", len))
    }

    // --- Serialization Methods (`add*`) ---

    /// Adds a uint256.
    pub fn add_u256(&mut self, value: U256) -> &mut Self {
        self.tokens.push(Token::Word(value.to_be_bytes::<WORD_SIZE>()));
        self
    }

    /// Adds a uint64 (any uintN up to 64 bits encodes the same way).
    pub fn add_u64(&mut self, value: u64) -> &mut Self {
        self.tokens.push(Token::Word(u64_word(value)));
        self
    }

    /// Adds a uint8.
    pub fn add_u8(&mut self, value: u8) -> &mut Self {
        self.add_u64(value as u64)
    }

    /// Adds a boolean (1 for true, 0 for false).
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.add_u64(if value { 1 } else { 0 })
    }

    /// Adds an address, left-padded to a full word.
    pub fn add_address(&mut self, value: Address) -> &mut Self {
        let mut word = [0u8; WORD_SIZE];
        word[ADDRESS_PADDING..].copy_from_slice(value.as_slice());
        self.tokens.push(Token::Word(word));
        self
    }

    /// Adds a dynamic byte string.
    pub fn add_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.tokens.push(Token::Dynamic(value.to_vec()));
        self
    }

    /// Adds a string (dynamic UTF-8 bytes).
    pub fn add_string(&mut self, value: &str) -> &mut Self {
        self.add_bytes(value.as_bytes())
    }
}

fn u64_word(value: u64) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    // Writing into a fixed 8 byte window cannot fail
    let _ = (&mut word[BYTES_64_OFFSET..]).write_u64::<BigEndian>(value);
    word
}

fn usize_word(value: usize) -> [u8; WORD_SIZE] {
    u64_word(value as u64)
}

fn read_u64_word(word: &[u8]) -> Result<u64> {
    if word[..BYTES_64_OFFSET].iter().any(|byte| *byte != 0) {
        bail!("Word does not fit in 64 bits");
    }
    (&word[BYTES_64_OFFSET..])
        .read_u64::<BigEndian>()
        .context("Failed to read u64 word")
}

fn padding_for(len: usize) -> usize {
    (WORD_SIZE - len % WORD_SIZE) % WORD_SIZE
}
