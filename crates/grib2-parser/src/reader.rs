//! Sequential reader over the GRIB messages of a byte buffer.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::message::Grib2Message;
use crate::sections::{
    parse_bitmap, parse_data_representation, parse_data_section, parse_grid_definition,
    parse_identification, parse_indicator, parse_product_definition, read_section_header, Bitmap,
};
use crate::tables::Grib2Tables;
use crate::Grib2Error;

const MAGIC: &[u8] = b"GRIB";
const END_MARKER: &[u8] = b"7777";

/// Reads GRIB2 fields one at a time.
///
/// Errors for a single message (unsupported edition, malformed section) leave
/// the reader positioned after that message, so iteration can continue. A
/// message that runs past the end of the buffer ends iteration.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    tables: Arc<Grib2Tables>,
    pending: VecDeque<Grib2Message>,
    messages_read: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes, tables: Arc<Grib2Tables>) -> Self {
        Self {
            data,
            offset: 0,
            tables,
            pending: VecDeque::new(),
            messages_read: 0,
        }
    }

    /// Read a whole file into memory and create a reader over it.
    pub fn open(path: impl AsRef<Path>, tables: Arc<Grib2Tables>) -> Result<Self, Grib2Error> {
        let data = std::fs::read(path.as_ref())?;
        Ok(Self::new(Bytes::from(data), tables))
    }

    /// Number of GRIB messages (not fields) decoded so far.
    pub fn messages_read(&self) -> usize {
        self.messages_read
    }

    /// Next field, `Ok(None)` once the buffer is exhausted.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }

            let Some(found) = find_magic(&self.data[self.offset..]) else {
                self.offset = self.data.len();
                return Ok(None);
            };
            let start = self.offset + found;
            let length = self.message_length(start)?;

            self.offset = start + length;
            let message = self.data.slice(start..start + length);
            let fields = parse_message(&message, &self.tables)?;
            self.messages_read += 1;

            trace!(offset = start, length, fields = fields.len(), "Decoded GRIB message");
            self.pending.extend(fields);
        }
    }

    /// Total length of the message starting at `start`, validating that it
    /// fits in the buffer. Unsupported editions are skipped.
    fn message_length(&mut self, start: usize) -> Result<usize, Grib2Error> {
        let available = self.data.len() - start;
        let header = &self.data[start..];

        if available < 16 {
            self.offset = self.data.len();
            return Err(Grib2Error::Truncated {
                offset: start,
                needed: 16,
                available,
            });
        }

        let edition = header[7];
        let length = match edition {
            // Edition 1: 3-byte length after the magic
            1 => u32::from_be_bytes([0, header[4], header[5], header[6]]) as usize,
            2 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&header[8..16]);
                usize::try_from(u64::from_be_bytes(raw)).unwrap_or(usize::MAX)
            }
            _ => {
                // Not a message we can size; resume scanning after the magic
                self.offset = start + MAGIC.len();
                return Err(Grib2Error::UnsupportedEdition(edition));
            }
        };

        if length < 16 || length > available {
            self.offset = self.data.len();
            return Err(Grib2Error::Truncated {
                offset: start,
                needed: length,
                available,
            });
        }

        if edition != 2 {
            debug!(offset = start, edition, "Skipping GRIB message of unsupported edition");
            self.offset = start + length;
            return Err(Grib2Error::UnsupportedEdition(edition));
        }

        Ok(length)
    }
}

impl Iterator for Grib2Reader {
    type Item = Result<Grib2Message, Grib2Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(MAGIC.len()).position(|window| window == MAGIC)
}

/// Split one GRIB2 message into its fields.
fn parse_message(message: &Bytes, tables: &Arc<Grib2Tables>) -> Result<Vec<Grib2Message>, Grib2Error> {
    let indicator = parse_indicator(message)?;

    let mut identification = None;
    let mut grid_definition = None;
    let mut product_definition = None;
    let mut data_representation = None;
    let mut bitmap: Option<Bytes> = None;
    let mut last_defined_bitmap: Option<Bytes> = None;
    let mut fields = Vec::new();
    let mut offset = 16;

    loop {
        let rest = &message[offset..];
        if rest.starts_with(END_MARKER) {
            break;
        }

        let (length, number) =
            read_section_header(rest).ok_or(Grib2Error::Truncated {
                offset,
                needed: 5,
                available: rest.len(),
            })?;
        if length < 5 || length > rest.len() {
            return Err(Grib2Error::InvalidSection {
                section: number,
                reason: format!("Invalid section length {}", length),
            });
        }
        let section = message.slice(offset..offset + length);

        match number {
            1 => identification = Some(parse_identification(&section)?),
            2 => {} // Local use section
            3 => grid_definition = Some(parse_grid_definition(&section)?),
            4 => product_definition = Some(parse_product_definition(&section)?),
            5 => data_representation = Some(parse_data_representation(&section)?),
            6 => {
                bitmap = match parse_bitmap(&section)? {
                    Bitmap::Present(bits) => {
                        last_defined_bitmap = Some(bits.clone());
                        Some(bits)
                    }
                    Bitmap::Previous => Some(
                        last_defined_bitmap
                            .clone()
                            .ok_or_else(|| Grib2Error::InvalidSection {
                                section: 6,
                                reason: "Refers to a previous bitmap but none was defined"
                                    .to_string(),
                            })?,
                    ),
                    Bitmap::Absent => None,
                    Bitmap::Predefined(indicator) => {
                        return Err(Grib2Error::InvalidSection {
                            section: 6,
                            reason: format!("Predefined bitmap {} is not supported", indicator),
                        })
                    }
                }
            }
            7 => {
                let field = Grib2Message::new(
                    indicator.clone(),
                    identification.clone().ok_or(Grib2Error::MissingSection(1))?,
                    grid_definition.clone().ok_or(Grib2Error::MissingSection(3))?,
                    product_definition.clone().ok_or(Grib2Error::MissingSection(4))?,
                    data_representation.clone().ok_or(Grib2Error::MissingSection(5))?,
                    bitmap.clone(),
                    parse_data_section(&section)?,
                    message.clone(),
                    fields.len(),
                    Arc::clone(tables),
                );
                fields.push(field);
            }
            other => {
                return Err(Grib2Error::InvalidSection {
                    section: other,
                    reason: "Unknown section number".to_string(),
                })
            }
        }

        offset += length;
    }

    Ok(fields)
}
