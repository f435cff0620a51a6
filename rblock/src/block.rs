use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rcore::BlockId;

use crate::context::ContainerContext;
use crate::deferred::Deferred;
use crate::error::{BlockError, Result};
use crate::field::Field;
use crate::reader::DataBlockReader;

/// Non owning reference to a parent block, only used for navigation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub id: BlockId,
    pub sequence_number: usize,
}

impl BlockRef {
    pub fn new(id: BlockId, sequence_number: usize) -> Self {
        BlockRef {
            id,
            sequence_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Header,
    Footer,
}

/// Ordered fields before or after the payload of a container.
#[derive(Debug)]
pub struct FieldSequence {
    id: BlockId,
    kind: SequenceKind,
    offset: u64,
    sequence_number: usize,
    parent: BlockRef,
    fields: Vec<Rc<Field>>,
}

pub type Header = FieldSequence;
pub type Footer = FieldSequence;

impl FieldSequence {
    pub(crate) fn new(
        id: BlockId,
        kind: SequenceKind,
        offset: u64,
        sequence_number: usize,
        parent: BlockRef,
        fields: Vec<Rc<Field>>,
    ) -> Self {
        FieldSequence {
            id,
            kind,
            offset,
            sequence_number,
            parent,
            fields,
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sequence_number(&self) -> usize {
        self.sequence_number
    }

    pub fn parent(&self) -> &BlockRef {
        &self.parent
    }

    pub fn fields(&self) -> &[Rc<Field>] {
        &self.fields
    }

    /// Undefined as soon as one field has no size yet.
    pub fn total_size(&self) -> Option<u64> {
        self.fields.iter().map(|f| f.size()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    FieldBased,
    ContainerBased,
}

#[derive(Debug, Clone)]
pub enum PayloadChild {
    Field(Rc<Field>),
    Container(Rc<Container>),
}

impl PayloadChild {
    pub fn total_size(&self) -> Option<u64> {
        match self {
            PayloadChild::Field(f) => f.size(),
            PayloadChild::Container(c) => c.total_size(),
        }
    }
}

/// What a lazy payload needs to read its children later on.
pub struct PayloadSource {
    pub reader: Rc<DataBlockReader>,
    pub context: Rc<ContainerContext>,
}

pub struct Payload {
    id: BlockId,
    kind: PayloadKind,
    offset: u64,
    parent: BlockRef,
    size: u64,
    children: RefCell<Deferred<Vec<PayloadChild>, PayloadSource>>,
}

pub(crate) fn summed_size(id: &BlockId, children: &[PayloadChild]) -> Result<u64> {
    children
        .iter()
        .map(|c| c.total_size())
        .sum::<Option<u64>>()
        .ok_or_else(|| BlockError::UndeterminedSize(id.clone()))
}

impl Payload {
    pub(crate) fn lazy(
        id: BlockId,
        kind: PayloadKind,
        offset: u64,
        parent: BlockRef,
        size: u64,
        source: PayloadSource,
    ) -> Self {
        Payload {
            id,
            kind,
            offset,
            parent,
            size,
            children: RefCell::new(Deferred::Unloaded(source)),
        }
    }

    /// Payload whose size is only known by reading all of its children.
    pub(crate) fn loaded(
        id: BlockId,
        kind: PayloadKind,
        offset: u64,
        parent: BlockRef,
        children: Vec<PayloadChild>,
    ) -> Result<Self> {
        let size = summed_size(&id, &children)?;

        Ok(Payload {
            id,
            kind,
            offset,
            parent,
            size,
            children: RefCell::new(Deferred::Loaded(children)),
        })
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn parent(&self) -> &BlockRef {
        &self.parent
    }

    pub fn total_size(&self) -> u64 {
        self.size
    }

    pub fn is_materialized(&self) -> bool {
        self.children.borrow().is_loaded()
    }

    pub fn children(&self) -> Result<Vec<PayloadChild>> {
        let me = BlockRef::new(self.id.clone(), 0);
        let mut children = self.children.borrow_mut();

        let loaded = children.force(|source| {
            source.reader.read_payload_children(
                &self.id,
                self.kind,
                self.offset,
                Some(self.size),
                &me,
                &source.context,
            )
        })?;
        Ok(loaded.clone())
    }

    pub fn fields(&self) -> Result<Vec<Rc<Field>>> {
        Ok(self
            .children()?
            .into_iter()
            .filter_map(|c| match c {
                PayloadChild::Field(f) => Some(f),
                PayloadChild::Container(_) => None,
            })
            .collect())
    }

    pub fn containers(&self) -> Result<Vec<Rc<Container>>> {
        Ok(self
            .children()?
            .into_iter()
            .filter_map(|c| match c {
                PayloadChild::Field(_) => None,
                PayloadChild::Container(c) => Some(c),
            })
            .collect())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

pub struct Container {
    id: BlockId,
    offset: u64,
    sequence_number: usize,
    parent: Option<BlockRef>,
    headers: Vec<Header>,
    payload: Payload,
    footers: Vec<Footer>,
    context: Rc<ContainerContext>,
}

impl Container {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: BlockId,
        offset: u64,
        sequence_number: usize,
        parent: Option<BlockRef>,
        headers: Vec<Header>,
        payload: Payload,
        footers: Vec<Footer>,
        context: Rc<ContainerContext>,
    ) -> Self {
        Container {
            id,
            offset,
            sequence_number,
            parent,
            headers,
            payload,
            footers,
            context,
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    /// Position of the first header byte, also when read backward.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sequence_number(&self) -> usize {
        self.sequence_number
    }

    pub fn parent(&self) -> Option<&BlockRef> {
        self.parent.as_ref()
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn footers(&self) -> &[Footer] {
        &self.footers
    }

    pub fn context(&self) -> &Rc<ContainerContext> {
        &self.context
    }

    pub fn total_size(&self) -> Option<u64> {
        let headers: Option<u64> = self.headers.iter().map(|h| h.total_size()).sum();
        let footers: Option<u64> = self.footers.iter().map(|f| f.total_size()).sum();

        Some(headers? + self.payload.total_size() + footers?)
    }

    /// Direct children in medium order.
    pub fn blocks(&self) -> Vec<Block<'_>> {
        let mut blocks: Vec<Block<'_>> = self.headers.iter().map(Block::Header).collect();
        blocks.push(Block::Payload(&self.payload));
        blocks.extend(self.footers.iter().map(Block::Footer));
        blocks
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("sequence_number", &self.sequence_number)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("footers", &self.footers)
            .finish()
    }
}

/// Any block of the tree, for code that walks it without caring which kind
/// it looks at.
#[derive(Debug, Clone, Copy)]
pub enum Block<'a> {
    Header(&'a Header),
    Footer(&'a Footer),
    Field(&'a Field),
    Payload(&'a Payload),
    Container(&'a Container),
}

impl Block<'_> {
    pub fn id(&self) -> &BlockId {
        match self {
            Block::Header(x) | Block::Footer(x) => x.id(),
            Block::Field(x) => x.id(),
            Block::Payload(x) => x.id(),
            Block::Container(x) => x.id(),
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            Block::Header(x) | Block::Footer(x) => Some(x.offset()),
            Block::Field(x) => x.offset(),
            Block::Payload(x) => Some(x.offset()),
            Block::Container(x) => Some(x.offset()),
        }
    }

    pub fn total_size(&self) -> Option<u64> {
        match self {
            Block::Header(x) | Block::Footer(x) => x.total_size(),
            Block::Field(x) => x.size(),
            Block::Payload(x) => Some(x.total_size()),
            Block::Container(x) => x.total_size(),
        }
    }
}
