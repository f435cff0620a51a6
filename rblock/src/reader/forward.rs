use std::rc::Rc;

use log::{debug, trace};

use rcore::{BlockId, PhysicalType};

use crate::block::{BlockRef, Container, Payload, PayloadSource};
use crate::context::ContainerContext;
use crate::error::{BlockError, Result};

use super::{consume, payload_kind, DataBlockReader};

impl DataBlockReader {
    // Headers, payload, footers with the cursor moving up
    pub(super) fn read_container_forward(
        self: &Rc<Self>,
        offset: u64,
        id: &BlockId,
        parent: Option<&BlockRef>,
        mut remaining: Option<u64>,
        parent_context: Option<Rc<ContainerContext>>,
        sequence_number: usize,
    ) -> Result<Container> {
        let context = self.new_context(parent_context);
        let id = self.determine_actual_container_id(offset, id, remaining, &context)?;
        let me = BlockRef::new(id.clone(), sequence_number);
        context.init_container(me.clone())?;
        debug!("Reading {} forward at {}", id, offset);

        let children = self.specification().children_of(&id);
        let mut cursor = offset;

        let mut headers = Vec::new();
        for child in children.iter().filter(|c| c.physical_type == PhysicalType::Header) {
            for header in
                self.read_headers_or_footers_with_id(cursor, &child.id, &me, remaining, &context)?
            {
                let size = header
                    .total_size()
                    .ok_or_else(|| BlockError::UndeterminedSize(header.id().clone()))?;
                cursor += size;
                remaining = consume(header.id(), remaining, size)?;
                headers.push(header);
            }
        }

        let payload_desc = self.specification().payload_of(&id).ok_or_else(|| {
            BlockError::InvalidSpecification(format!("container {} has no payload", id))
        })?;
        let payload = self.read_payload(cursor, &payload_desc.id, &me, remaining, &context)?;
        cursor += payload.total_size();
        remaining = consume(payload.id(), remaining, payload.total_size())?;

        let mut footers = Vec::new();
        for child in children.iter().filter(|c| c.physical_type == PhysicalType::Footer) {
            for footer in
                self.read_headers_or_footers_with_id(cursor, &child.id, &me, remaining, &context)?
            {
                let size = footer
                    .total_size()
                    .ok_or_else(|| BlockError::UndeterminedSize(footer.id().clone()))?;
                cursor += size;
                remaining = consume(footer.id(), remaining, size)?;
                footers.push(footer);
            }
        }

        trace!("{} spans {}..{}", id, offset, cursor);
        Ok(self.factory().create_container(
            id,
            offset,
            sequence_number,
            parent,
            headers,
            payload,
            footers,
            context,
        ))
    }

    // Size from the context, else all of the parent that the footers leave.
    // Without either the children are read now and summed up.
    pub(super) fn read_payload_forward(
        self: &Rc<Self>,
        offset: u64,
        id: &BlockId,
        parent: &BlockRef,
        remaining: Option<u64>,
        context: &Rc<ContainerContext>,
    ) -> Result<Payload> {
        let desc = self.describe(id)?;
        let kind = payload_kind(&desc)?;

        let size = match context.get_size_of(id, 0)? {
            Some(size) => Some(size),
            None => remaining.and_then(|r| r.checked_sub(self.static_footer_size(&parent.id))),
        };
        if let (Some(size), Some(remaining)) = (size, remaining) {
            if size > remaining {
                return Err(BlockError::InsufficientBytes {
                    id: id.clone(),
                    needed: size,
                    remaining,
                });
            }
        }

        if !self.provider().is_random_access() {
            self.provider().buffer_before_read(offset, size)?;
        }

        match size {
            Some(size) => Ok(self.factory().create_lazy_payload(
                id.clone(),
                kind,
                offset,
                parent,
                size,
                PayloadSource {
                    reader: self.clone(),
                    context: context.clone(),
                },
            )),
            None => {
                let me = BlockRef::new(id.clone(), 0);
                let children = self.read_payload_children(id, kind, offset, None, &me, context)?;
                self.factory()
                    .create_loaded_payload(id.clone(), kind, offset, parent, children)
            }
        }
    }
}
