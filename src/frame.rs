// Frame loop
//
// One frame in flight. The fence wait at the top is what makes it safe to
// reset the command buffer and overwrite the vertex buffer afterwards.

use crate::error::Result;
use crate::geometry::{triangle_vertices, TriangleVertices};

/// The operations a frame is built from, in the order `draw_frame` calls them.
pub trait FrameTarget {
    /// Block until the GPU has finished the previously submitted frame.
    fn wait_for_previous_frame(&mut self) -> Result<()>;
    fn reset_frame_fence(&mut self) -> Result<()>;
    fn reset_commands(&mut self) -> Result<()>;
    /// Index of the swapchain image to render into. Not necessarily sequential.
    fn acquire_image(&mut self) -> Result<u32>;
    fn write_vertices(&mut self, vertices: &TriangleVertices) -> Result<()>;
    fn record_commands(&mut self, image_index: u32) -> Result<()>;
    fn submit(&mut self) -> Result<()>;
    fn present(&mut self, image_index: u32) -> Result<()>;
}

/// Render and present one frame of the triangle at phase `cycle`.
///
/// Returns the swapchain image index that was presented. The first error
/// aborts the frame.
pub fn draw_frame<T: FrameTarget + ?Sized>(target: &mut T, cycle: f32) -> Result<u32> {
    target.wait_for_previous_frame()?;
    target.reset_frame_fence()?;
    target.reset_commands()?;

    let image_index = target.acquire_image()?;

    target.write_vertices(&triangle_vertices(cycle))?;
    target.record_commands(image_index)?;
    target.submit()?;
    target.present(image_index)?;

    log::trace!("Presented image {} at cycle {:.3}", image_index, cycle);
    Ok(image_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use ash::vk;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Call {
        Wait,
        ResetFence,
        ResetCommands,
        Acquire,
        Write,
        Record(u32),
        Submit,
        Present(u32),
    }

    /// Stand-in GPU: a submission stays pending until the next fence wait.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        pending_submission: bool,
        acquire_order: Vec<u32>,
        acquired: usize,
        written: Vec<TriangleVertices>,
        fail_on: Option<Call>,
    }

    impl Recorder {
        fn with_acquire_order(order: &[u32]) -> Self {
            Self {
                acquire_order: order.to_vec(),
                ..Default::default()
            }
        }

        fn log(&mut self, call: Call) -> Result<()> {
            self.calls.push(call);
            if self.fail_on == Some(call) {
                return Err(EngineError::Vulkan {
                    op: "injected",
                    result: vk::Result::ERROR_DEVICE_LOST,
                });
            }
            Ok(())
        }
    }

    impl FrameTarget for Recorder {
        fn wait_for_previous_frame(&mut self) -> Result<()> {
            self.log(Call::Wait)?;
            self.pending_submission = false;
            Ok(())
        }

        fn reset_frame_fence(&mut self) -> Result<()> {
            self.log(Call::ResetFence)
        }

        fn reset_commands(&mut self) -> Result<()> {
            assert!(!self.pending_submission, "command buffer reset while pending");
            self.log(Call::ResetCommands)
        }

        fn acquire_image(&mut self) -> Result<u32> {
            self.log(Call::Acquire)?;
            let index = self.acquire_order[self.acquired % self.acquire_order.len()];
            self.acquired += 1;
            Ok(index)
        }

        fn write_vertices(&mut self, vertices: &TriangleVertices) -> Result<()> {
            assert!(!self.pending_submission, "vertex buffer written while pending");
            self.log(Call::Write)?;
            self.written.push(*vertices);
            Ok(())
        }

        fn record_commands(&mut self, image_index: u32) -> Result<()> {
            self.log(Call::Record(image_index))
        }

        fn submit(&mut self) -> Result<()> {
            self.log(Call::Submit)?;
            self.pending_submission = true;
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> Result<()> {
            self.log(Call::Present(image_index))
        }
    }

    #[test]
    fn steps_run_in_protocol_order() {
        let mut target = Recorder::with_acquire_order(&[0]);

        let presented = draw_frame(&mut target, 0.0).unwrap();

        assert_eq!(presented, 0);
        assert_eq!(
            target.calls,
            vec![
                Call::Wait,
                Call::ResetFence,
                Call::ResetCommands,
                Call::Acquire,
                Call::Write,
                Call::Record(0),
                Call::Submit,
                Call::Present(0),
            ]
        );
    }

    #[test]
    fn geometry_is_never_written_while_gpu_is_busy() {
        let mut target = Recorder::with_acquire_order(&[0, 1]);

        // The stand-in asserts on any write or reset while a submission is pending
        for frame in 0..10 {
            draw_frame(&mut target, frame as f32 / 10.0).unwrap();
            assert!(target.pending_submission);
        }

        // Between every submit and the following write there is a wait
        let mut waited_since_submit = true;
        for call in &target.calls {
            match call {
                Call::Submit => waited_since_submit = false,
                Call::Wait => waited_since_submit = true,
                Call::Write => assert!(waited_since_submit),
                _ => {}
            }
        }
    }

    #[test]
    fn acquired_index_selects_record_and_present() {
        let mut target = Recorder::with_acquire_order(&[1, 0, 0, 1]);

        let presented: Vec<u32> = (0..4)
            .map(|_| draw_frame(&mut target, 0.25).unwrap())
            .collect();
        assert_eq!(presented, vec![1, 0, 0, 1]);

        let recorded: Vec<u32> = target
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Record(index) => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(recorded, presented);
    }

    #[test]
    fn failing_step_aborts_the_frame() {
        let mut target = Recorder::with_acquire_order(&[1]);
        target.fail_on = Some(Call::Acquire);

        let err = draw_frame(&mut target, 0.0).unwrap_err();

        assert!(matches!(
            err,
            EngineError::Vulkan { result: vk::Result::ERROR_DEVICE_LOST, .. }
        ));
        assert_eq!(
            target.calls,
            vec![Call::Wait, Call::ResetFence, Call::ResetCommands, Call::Acquire]
        );
        assert!(target.written.is_empty());
    }

    #[test]
    fn failed_submit_skips_present() {
        let mut target = Recorder::with_acquire_order(&[0]);
        target.fail_on = Some(Call::Submit);

        assert!(draw_frame(&mut target, 0.0).is_err());
        assert_eq!(target.calls.last(), Some(&Call::Submit));
        assert!(!target.calls.contains(&Call::Present(0)));
    }

    #[test]
    fn written_vertices_follow_the_cycle() {
        let mut target = Recorder::with_acquire_order(&[0]);

        draw_frame(&mut target, 0.0).unwrap();
        draw_frame(&mut target, 0.4).unwrap();

        assert_eq!(target.written, vec![triangle_vertices(0.0), triangle_vertices(0.4)]);
    }
}
