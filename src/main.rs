use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use iced::widget::image as picture;
use iced::widget::{button, column, container, row, scrollable, text, Column, Row};
use iced::{ContentFit, Element, Length, Task, Theme};
use image::DynamicImage;
use log::{error, info, warn};
use tokio::runtime::Handle;

use contact_gallery::remote::{build_client, HttpContactSource, HttpPhotoFetcher, PhotoFetcher};
use contact_gallery::state::{
    delete_selected, save_selected, ContactListController, ContactRecord, DeleteReport,
    GalleryStore, LoadState, SaveReport, SavedImage, Selection, StorageLocation,
};
use contact_gallery::Settings;

/// Cells per grid row
const GRID_COLUMNS: usize = 3;

/// Edge length of saved image tiles, in logical pixels
const TILE_SIZE: f32 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Online,
    Saved,
}

/// Main application state
struct ContactGallery {
    /// Runtime all network and storage work is spawned on
    runtime: Handle,
    controller: Arc<ContactListController>,
    fetcher: Arc<dyn PhotoFetcher>,
    /// None when the album could not be opened
    gallery: Option<GalleryStore>,
    tab: Tab,
    contacts: Vec<ContactRecord>,
    /// Contact photos by URL, filled in as downloads finish (None = failed)
    photos: HashMap<String, Option<picture::Handle>>,
    selected_contacts: Selection<ContactRecord>,
    saved_images: Vec<SavedImage>,
    selected_images: Selection<StorageLocation>,
    /// A bulk save or delete is running
    busy: bool,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    TabSelected(Tab),
    /// The contact fetch finished
    ContactsSettled(LoadState),
    ReloadContacts,
    /// A grid photo finished downloading (None if the task was cancelled)
    PhotoLoaded(Option<(String, Result<picture::Handle, String>)>),
    ToggleContact(usize),
    SaveSelected,
    SaveFinished(Option<SaveReport>),
    SavedImagesLoaded(Result<Vec<SavedImage>, String>),
    ToggleImage(StorageLocation),
    DeleteSelected,
    DeleteFinished(Option<DeleteReport>),
}

/// Run `fut` on the I/O runtime. Resolves to None if the task was cancelled.
fn on_runtime<T, F>(runtime: &Handle, fut: F) -> impl Future<Output = Option<T>> + Send + 'static
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let handle = runtime.spawn(fut);
    async move { handle.await.ok() }
}

impl ContactGallery {
    fn new(
        runtime: Handle,
        controller: Arc<ContactListController>,
        fetcher: Arc<dyn PhotoFetcher>,
        gallery: Option<GalleryStore>,
    ) -> (Self, Task<Message>) {
        let status = if gallery.is_some() {
            "Loading contacts...".to_string()
        } else {
            "Album unavailable, saving is disabled.".to_string()
        };

        let app = ContactGallery {
            runtime,
            controller,
            fetcher,
            gallery,
            tab: Tab::Online,
            contacts: Vec::new(),
            photos: HashMap::new(),
            selected_contacts: Selection::new(),
            saved_images: Vec::new(),
            selected_images: Selection::new(),
            busy: false,
            status,
        };

        app.controller.load();
        let task = app.wait_for_contacts();
        (app, task)
    }

    fn wait_for_contacts(&self) -> Task<Message> {
        Task::perform(self.controller.wait_settled(), Message::ContactsSettled)
    }

    /// Download the photo of every contact not shown yet
    fn load_photos(&self) -> Task<Message> {
        let urls = missing_photo_urls(&self.contacts, &self.photos);
        Task::batch(urls.into_iter().map(|url| {
            let fetcher = Arc::clone(&self.fetcher);
            Task::perform(
                on_runtime(&self.runtime, async move {
                    let photo = fetcher.fetch(&url).await.map(|bitmap| photo_handle(&bitmap));
                    (url, photo.map_err(|e| e.to_string()))
                }),
                Message::PhotoLoaded,
            )
        }))
    }

    fn refresh_saved_images(&self) -> Task<Message> {
        let Some(gallery) = self.gallery.clone() else {
            return Task::none();
        };
        Task::perform(
            on_runtime(&self.runtime, async move {
                gallery.list_all().await.map_err(|e| e.to_string())
            }),
            |result| {
                Message::SavedImagesLoaded(
                    result.unwrap_or_else(|| Err("listing was cancelled".to_string())),
                )
            },
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::TabSelected(tab) => {
                self.tab = tab;
                match tab {
                    Tab::Online => {
                        // No-op once the first fetch has run
                        if self.controller.load() {
                            return self.wait_for_contacts();
                        }
                        Task::none()
                    }
                    Tab::Saved => self.refresh_saved_images(),
                }
            }
            Message::ContactsSettled(state) => {
                self.contacts = self.controller.contacts();
                self.selected_contacts.retain_available(&self.contacts);
                self.status = match state {
                    LoadState::Loaded => format!("{} contacts loaded.", self.contacts.len()),
                    _ => self.controller.error().unwrap_or_default(),
                };
                self.load_photos()
            }
            Message::PhotoLoaded(loaded) => {
                match loaded {
                    Some((url, Ok(handle))) => {
                        self.photos.insert(url, Some(handle));
                    }
                    Some((url, Err(err))) => {
                        warn!("No photo for {}: {}", url, err);
                        self.photos.insert(url, None);
                    }
                    None => {}
                }
                Task::none()
            }
            Message::ReloadContacts => {
                self.controller.reload();
                self.status = "Loading contacts...".to_string();
                self.wait_for_contacts()
            }
            Message::ToggleContact(index) => {
                if let Some(contact) = self.contacts.get(index) {
                    self.selected_contacts.toggle(contact.clone());
                }
                Task::none()
            }
            Message::SaveSelected => {
                let Some(gallery) = self.gallery.clone() else {
                    return Task::none();
                };
                if self.busy || self.selected_contacts.is_empty() {
                    return Task::none();
                }

                self.busy = true;
                self.status = format!("Saving {} photos...", self.selected_contacts.len());

                let fetcher = Arc::clone(&self.fetcher);
                let contacts = self.selected_contacts.items().to_vec();
                Task::perform(
                    on_runtime(&self.runtime, async move {
                        save_selected(fetcher.as_ref(), &gallery, &contacts).await
                    }),
                    Message::SaveFinished,
                )
            }
            Message::SaveFinished(report) => {
                self.busy = false;
                match report {
                    Some(report) => {
                        self.status = format!(
                            "✅ Saved {} photos, {} failed.",
                            report.saved.len(),
                            report.failed.len()
                        );
                        if report.is_complete() {
                            self.selected_contacts.clear();
                        }
                    }
                    None => self.status = "Saving was interrupted.".to_string(),
                }
                Task::none()
            }
            Message::SavedImagesLoaded(result) => {
                match result {
                    Ok(images) => {
                        let locations: Vec<StorageLocation> =
                            images.iter().map(|i| i.location).collect();
                        self.selected_images.retain_available(&locations);
                        self.status = format!("{} saved images.", images.len());
                        self.saved_images = images;
                    }
                    Err(err) => {
                        error!("Failed to list saved images: {}", err);
                        self.saved_images.clear();
                        self.selected_images.clear();
                        self.status = "Could not read the album.".to_string();
                    }
                }
                Task::none()
            }
            Message::ToggleImage(location) => {
                self.selected_images.toggle(location);
                Task::none()
            }
            Message::DeleteSelected => {
                let Some(gallery) = self.gallery.clone() else {
                    return Task::none();
                };
                if self.busy || self.selected_images.is_empty() {
                    return Task::none();
                }

                self.busy = true;
                let locations = self.selected_images.items().to_vec();
                Task::perform(
                    on_runtime(&self.runtime, async move {
                        delete_selected(&gallery, &locations).await
                    }),
                    Message::DeleteFinished,
                )
            }
            Message::DeleteFinished(report) => {
                self.busy = false;
                self.selected_images.clear();
                if let Some(report) = report {
                    info!("Deleted {} images", report.deleted.len());
                }
                self.refresh_saved_images()
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let tabs = row![
            tab_button("Online Image", Tab::Online, self.tab),
            tab_button("Saved Image", Tab::Saved, self.tab),
        ]
        .spacing(10);

        let body = match self.tab {
            Tab::Online => self.online_view(),
            Tab::Saved => self.saved_view(),
        };

        let content = column![tabs, text(&self.status).size(14), body]
            .spacing(16)
            .padding(20);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn online_view(&self) -> Element<Message> {
        let can_save = !self.busy && self.gallery.is_some() && !self.selected_contacts.is_empty();
        let actions = row![
            button("Save Image")
                .on_press_maybe(can_save.then_some(Message::SaveSelected))
                .padding(10),
            button("Reload")
                .on_press_maybe((!self.busy).then_some(Message::ReloadContacts))
                .padding(10),
        ]
        .spacing(10);

        let cells: Vec<Element<Message>> = self
            .contacts
            .iter()
            .enumerate()
            .map(|(index, contact)| {
                let marker = if self.selected_contacts.contains(contact) { "✔ " } else { "" };
                let name = match contact.display_name() {
                    name if name.is_empty() => format!("#{}", contact.id),
                    name => name,
                };
                let photo: Element<Message> = match self.photos.get(&contact.picture_url) {
                    Some(Some(handle)) => picture::Image::<picture::Handle>::new(handle.clone())
                        .width(Length::Fixed(TILE_SIZE))
                        .height(Length::Fixed(TILE_SIZE))
                        .content_fit(ContentFit::Cover)
                        .into(),
                    cached => {
                        let placeholder = if contact.has_picture() && cached.is_none() {
                            "Loading..."
                        } else {
                            "No photo"
                        };
                        container(text(placeholder).size(11))
                            .center(Length::Fixed(TILE_SIZE))
                            .into()
                    }
                };
                button(column![photo, text(format!("{}{}", marker, name)).size(14)].spacing(4))
                    .on_press(Message::ToggleContact(index))
                    .width(Length::Fill)
                    .padding(10)
                    .into()
            })
            .collect();

        column![actions, grid(cells)].spacing(12).into()
    }

    fn saved_view(&self) -> Element<Message> {
        let can_delete = !self.busy && !self.selected_images.is_empty();
        let actions = row![button("Delete Selected Images")
            .on_press_maybe(can_delete.then_some(Message::DeleteSelected))
            .padding(10)];

        let cells: Vec<Element<Message>> = self
            .saved_images
            .iter()
            .map(|saved| {
                let marker = if self.selected_images.contains(&saved.location) { "✔ " } else { "" };
                let tile = picture::Image::<picture::Handle>::new(picture::Handle::from_path(
                    saved.path.clone(),
                ))
                    .width(Length::Fixed(TILE_SIZE))
                    .height(Length::Fixed(TILE_SIZE))
                    .content_fit(ContentFit::Cover);
                button(
                    column![tile, text(format!("{}{}", marker, saved.display_name)).size(12)]
                        .spacing(4),
                )
                .on_press(Message::ToggleImage(saved.location))
                .padding(6)
                .into()
            })
            .collect();

        column![actions, grid(cells)].spacing(12).into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Photo URLs of `contacts` not downloaded or attempted yet, each once
fn missing_photo_urls(
    contacts: &[ContactRecord],
    photos: &HashMap<String, Option<picture::Handle>>,
) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for contact in contacts {
        if contact.has_picture()
            && !photos.contains_key(&contact.picture_url)
            && !urls.contains(&contact.picture_url)
        {
            urls.push(contact.picture_url.clone());
        }
    }
    urls
}

/// Turn a decoded bitmap into something the image widget can draw
fn photo_handle(bitmap: &DynamicImage) -> picture::Handle {
    let rgba = bitmap.to_rgba8();
    picture::Handle::from_rgba(rgba.width(), rgba.height(), rgba.into_raw())
}

fn tab_button(label: &str, tab: Tab, current: Tab) -> Element<'static, Message> {
    let label = if tab == current {
        format!("● {}", label)
    } else {
        label.to_string()
    };
    button(text(label))
        .on_press(Message::TabSelected(tab))
        .padding(10)
        .into()
}

/// Lay cells out in rows of `GRID_COLUMNS`
fn grid(cells: Vec<Element<'_, Message>>) -> Element<'_, Message> {
    let mut rows = Column::new().spacing(8);
    let mut cells = cells.into_iter().peekable();
    while cells.peek().is_some() {
        let mut line = Row::new().spacing(8);
        for cell in cells.by_ref().take(GRID_COLUMNS) {
            line = line.push(cell);
        }
        rows = rows.push(line);
    }
    scrollable(rows).height(Length::Fill).into()
}

fn main() -> iced::Result {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("contact_gallery=info"),
    )
    .init();

    let settings = Settings::load();

    // I/O runtime for fetches and album work, kept separate from the UI loop
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start the I/O runtime: {}", err);
            std::process::exit(1);
        }
    };

    let client = match build_client(&settings) {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to build the HTTP client: {}", err);
            std::process::exit(1);
        }
    };

    let gallery = match runtime.block_on(GalleryStore::open(&settings)) {
        Ok(gallery) => Some(gallery),
        Err(err) => {
            error!("Failed to open the album: {}", err);
            None
        }
    };

    let source = HttpContactSource::with_client(client.clone(), settings.endpoint.clone());
    info!("🎨 Contact Gallery fetching from {}", source.endpoint());

    let fetcher: Arc<dyn PhotoFetcher> = Arc::new(HttpPhotoFetcher::with_client(client));
    let controller = Arc::new(ContactListController::new(
        Arc::new(source),
        runtime.handle().clone(),
    ));
    let handle = runtime.handle().clone();

    let result = iced::application(
        "Contact Gallery",
        ContactGallery::update,
        ContactGallery::view,
    )
    .theme(ContactGallery::theme)
    .centered()
    .run_with(move || ContactGallery::new(handle, controller, fetcher, gallery));

    runtime.shutdown_background();
    result
}
