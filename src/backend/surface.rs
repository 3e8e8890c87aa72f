// Presentation surface - the window-system binding
//
// Thin wrapper so the renderer can query capabilities and destroy the
// surface in the right order (before the instance) without platform code.

use crate::error::Result;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::window::Window;

pub struct WindowSurface {
    pub loader: ash::extensions::khr::Surface,
    pub raw: vk::SurfaceKHR,
}

impl WindowSurface {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance, window: &Window) -> Result<Self> {
        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        let loader = ash::extensions::khr::Surface::new(entry, instance);
        let raw = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
        }?;

        Ok(Self { loader, raw })
    }

    /// Must be called before the owning instance is destroyed.
    pub fn destroy(&self) {
        unsafe {
            self.loader.destroy_surface(self.raw, None);
        }
    }
}
