// SPDX-License-Identifier: CEPL-1.0
//! Scope guards for per-attempt synchronization objects and the command
//! sequence that moves a staged frame into a chain image.

use crate::chain::ChainImage;
use crate::device::{Device, SubmitSync};
use crate::error::Result;
use crate::staging::StagingImage;
use crate::types::{Extent, ImageLayout};
use tracing::warn;

pub(crate) struct Semaphore<'d, D: Device> {
    device: &'d D,
    handle: D::Semaphore,
}

impl<'d, D: Device> Semaphore<'d, D> {
    pub(crate) fn new(device: &'d D) -> Result<Self> {
        let handle = device.create_semaphore()?;
        Ok(Self { device, handle })
    }

    pub(crate) fn handle(&self) -> D::Semaphore {
        self.handle
    }
}

impl<D: Device> Drop for Semaphore<'_, D> {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.handle);
    }
}

pub(crate) struct Fence<'d, D: Device> {
    device: &'d D,
    handle: D::Fence,
}

impl<'d, D: Device> Fence<'d, D> {
    pub(crate) fn new(device: &'d D) -> Result<Self> {
        let handle = device.create_fence()?;
        Ok(Self { device, handle })
    }

    pub(crate) fn handle(&self) -> D::Fence {
        self.handle
    }

    pub(crate) fn wait(&self) -> Result<()> {
        self.device.wait_for_fence(self.handle)?;
        Ok(())
    }
}

impl<D: Device> Drop for Fence<'_, D> {
    fn drop(&mut self) {
        self.device.destroy_fence(self.handle);
    }
}

pub(crate) struct CommandBuffer<'d, D: Device> {
    device: &'d D,
    queue: D::Queue,
    handle: D::CommandBuffer,
}

impl<'d, D: Device> CommandBuffer<'d, D> {
    /// Allocates and begins one-time-submit recording.
    pub(crate) fn begin(device: &'d D, queue: D::Queue) -> Result<Self> {
        let handle = device.allocate_command_buffer(queue)?;
        let cmd = Self {
            device,
            queue,
            handle,
        };
        device.begin_command_buffer(handle)?;
        Ok(cmd)
    }

    pub(crate) fn handle(&self) -> D::CommandBuffer {
        self.handle
    }
}

impl<D: Device> Drop for CommandBuffer<'_, D> {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.queue, self.handle);
    }
}

/// Records `record` into a fresh command buffer, submits it and blocks
/// until it has executed.
pub(crate) fn one_shot<D: Device>(
    device: &D,
    queue: D::Queue,
    record: impl FnOnce(D::CommandBuffer),
) -> Result<()> {
    let cmd = CommandBuffer::begin(device, queue)?;
    record(cmd.handle());
    device.end_command_buffer(cmd.handle())?;

    let fence = Fence::new(device)?;
    device.queue_submit(
        queue,
        cmd.handle(),
        SubmitSync {
            wait: None,
            signal: None,
            fence: fence.handle(),
        },
    )?;
    fence.wait()
}

/// A fully recorded staging-to-chain copy, ready to be submitted once.
pub(crate) struct Transfer<'d, D: Device> {
    device: &'d D,
    queue: D::Queue,
    cmd: CommandBuffer<'d, D>,
    fence: Fence<'d, D>,
    in_flight: bool,
}

impl<'d, D: Device> Transfer<'d, D> {
    /// Records: chain image to transfer-destination, staging image to
    /// transfer-source, copy of the overlapping region, chain image to
    /// present-source.
    pub(crate) fn record(
        device: &'d D,
        queue: D::Queue,
        staging: &StagingImage<'d, D>,
        target: &ChainImage<D>,
    ) -> Result<Self> {
        let region = copy_region(target.extent, staging.extent());

        let cmd = CommandBuffer::begin(device, queue)?;
        let h = cmd.handle();
        device.cmd_transition_layout(
            h,
            target.image,
            target.layout,
            ImageLayout::TransferDstOptimal,
        );
        device.cmd_transition_layout(
            h,
            staging.image(),
            staging.layout(),
            ImageLayout::TransferSrcOptimal,
        );
        device.cmd_copy_image(h, staging.image(), target.image, region);
        device.cmd_transition_layout(
            h,
            target.image,
            ImageLayout::TransferDstOptimal,
            ImageLayout::PresentSrc,
        );
        device.end_command_buffer(h)?;

        let fence = Fence::new(device)?;

        Ok(Self {
            device,
            queue,
            cmd,
            fence,
            in_flight: false,
        })
    }

    /// Runs after `wait` is signalled; signals `signal` and the transfer
    /// fence on completion. The images' tracked layouts follow the recorded
    /// barriers once the submission is accepted.
    pub(crate) fn submit(
        &mut self,
        staging: &mut StagingImage<'d, D>,
        target: &mut ChainImage<D>,
        wait: D::Semaphore,
        signal: D::Semaphore,
    ) -> Result<()> {
        self.device.queue_submit(
            self.queue,
            self.cmd.handle(),
            SubmitSync {
                wait: Some(wait),
                signal: Some(signal),
                fence: self.fence.handle(),
            },
        )?;
        self.in_flight = true;
        staging.set_layout(ImageLayout::TransferSrcOptimal);
        target.layout = ImageLayout::PresentSrc;
        Ok(())
    }

    pub(crate) fn wait(&mut self) -> Result<()> {
        if self.in_flight {
            self.fence.wait()?;
            self.in_flight = false;
        }
        Ok(())
    }
}

impl<D: Device> Drop for Transfer<'_, D> {
    fn drop(&mut self) {
        if let Err(e) = self.wait() {
            warn!("releasing transfer resources without completion: {e}");
        }
    }
}

/// Overlap of the chain and frame extents; no scaling.
pub fn copy_region(chain: Extent, frame: Extent) -> Extent {
    chain.min(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_region_is_the_overlap() {
        assert_eq!(
            copy_region(Extent::new(640, 480), Extent::new(320, 720)),
            Extent::new(320, 480)
        );
        assert_eq!(
            copy_region(Extent::new(320, 240), Extent::new(320, 240)),
            Extent::new(320, 240)
        );
    }
}
