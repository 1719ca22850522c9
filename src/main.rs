mod config;
mod controller;
mod gemini;
mod markdown;
mod topics;

use iced::{
    alignment, border, clipboard,
    event::{self, Event as IcedEvent},
    font,
    keyboard::{self, Key},
    theme::Palette,
    time,
    widget::{
        button, column, container, horizontal_space, rich_text, row, scrollable, span, text,
        text::Span, text_input, text_input::Id,
    },
    window, Color, Element, Font, Length, Padding, Subscription, Task, Theme,
};
use std::sync::Arc;
use std::time::Duration;

use controller::{Block, Controller, Dispatch, DispatchError, RequestState, Role};
use gemini::{ApiError, GeminiClient};
use topics::Topic;

const BOLD: Font = Font {
    weight: font::Weight::Bold,
    ..Font::MONOSPACE
};

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn main() -> iced::Result {
    if std::env::var_os("GEMINI_API_KEY").is_none() {
        eprintln!("Warning: the GEMINI_API_KEY environment variable is not set.");
        eprintln!("The assistant will start, but AI features will be disabled.");
    }

    let config = config::Config::load();

    iced::application("Defect Research Assistant", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: iced::Size::new(config.window.width as f32, config.window.height as f32),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(App::new)
}

#[derive(Debug, Clone)]
enum Message {
    InputChanged(String),
    TopicPressed(Topic),
    Submit,
    ResponseReceived(String),
    RequestFailed(ApiError),
    Tick,
    CopyOutput,
    Exit,
}

struct App {
    input_text: String,
    warning: Option<String>,
    loading_frame: usize,
    controller: Controller,
    client: Option<Arc<GeminiClient>>,
    input_id: Id,
}

impl App {
    fn new() -> (Self, Task<Message>) {
        let config = config::Config::load();

        let client =
            match GeminiClient::from_env(config.gemini.host.clone(), config.gemini.model.clone()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    eprintln!("Warning: could not initialize the Gemini client: {}", e);
                    eprintln!("Chat and lookups are disabled for this session.");
                    None
                }
            };

        let notice = if client.is_some() {
            "Select a defect on the left for a technical explanation, or use the chat below."
        } else {
            "ERROR: the Gemini client is not configured. Chat and lookups are disabled."
        };

        let controller = Controller::new(client.is_some(), notice.to_string());
        let input_id = Id::unique();

        let app = App {
            input_text: String::new(),
            warning: None,
            loading_frame: 0,
            controller,
            client,
            input_id: input_id.clone(),
        };

        (app, text_input::focus(input_id))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputChanged(value) => {
                self.input_text = value;
                self.warning = None;
                Task::none()
            }
            Message::TopicPressed(topic) => {
                let dispatch = self.controller.dispatch_topic(topic);
                self.run_dispatch(dispatch)
            }
            Message::Submit => {
                let dispatch = self.controller.dispatch_chat(&self.input_text);
                if dispatch.is_ok() {
                    self.input_text.clear();
                }
                self.run_dispatch(dispatch)
            }
            Message::ResponseReceived(response) => {
                self.controller.complete(response);
                Task::none()
            }
            Message::RequestFailed(error) => {
                self.controller.fail(error.to_string());
                Task::none()
            }
            Message::Tick => {
                if self.controller.is_loading() {
                    self.loading_frame = (self.loading_frame + 1) % SPINNER_FRAMES.len();
                }
                Task::none()
            }
            Message::CopyOutput => {
                if let RequestState::Success(response) = self.controller.state() {
                    clipboard::write(response.clone())
                } else {
                    Task::none()
                }
            }
            Message::Exit => iced::exit(),
        }
    }

    fn run_dispatch(&mut self, dispatch: Result<Dispatch, DispatchError>) -> Task<Message> {
        match dispatch {
            Ok(dispatch) => {
                self.warning = None;
                match self.client.clone() {
                    Some(client) => Task::future(async move {
                        match client
                            .generate(&dispatch.user_prompt, &dispatch.system_instruction)
                            .await
                        {
                            Ok(response) => Message::ResponseReceived(response),
                            Err(error) => Message::RequestFailed(error),
                        }
                    }),
                    None => {
                        // The controller refuses dispatches when no client came
                        // up; recover here rather than hang in Loading if the
                        // two ever disagree.
                        self.controller
                            .fail("the Gemini client is not configured".to_string());
                        Task::none()
                    }
                }
            }
            Err(DispatchError::Unavailable) => {
                self.warning = Some(
                    "The Gemini client could not be initialized. AI features are disabled."
                        .to_string(),
                );
                Task::none()
            }
            Err(DispatchError::EmptyPrompt) => {
                self.warning = Some("Please enter a question.".to_string());
                Task::none()
            }
            Err(DispatchError::Busy) => Task::none(),
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.controller.is_loading() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Exit)
            } else {
                None
            }
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<Message> {
        let enabled = self.controller.controls_enabled();

        let mut input = text_input("Ask Gemini about a defect or metallurgy...", &self.input_text)
            .padding(12)
            .size(13)
            .id(self.input_id.clone());
        if enabled {
            input = input
                .on_input(Message::InputChanged)
                .on_submit(Message::Submit);
        }

        let send = button(text("Send").size(13).font(BOLD))
            .on_press_maybe(enabled.then_some(Message::Submit))
            .padding(Padding::from([12, 20]))
            .style(button::primary);

        let mut main_area = column![
            text("AI-generated technical explanation")
                .size(18)
                .font(BOLD)
                .style(text::success),
            self.view_output(),
        ]
        .spacing(10);

        if let Some(warning) = &self.warning {
            main_area = main_area.push(text(warning.clone()).size(13).style(text::danger));
        }

        if matches!(self.controller.state(), RequestState::Success(_)) {
            let copy_button = container(
                button(text("[Copy]").size(13))
                    .on_press(Message::CopyOutput)
                    .padding(8),
            )
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Right);
            main_area = main_area.push(copy_button);
        }

        main_area = main_area.push(row![input, send].spacing(10));

        let body = row![
            self.view_sidebar(),
            container(main_area)
                .padding(15)
                .width(Length::Fill)
                .height(Length::Fill)
                .style(panel),
        ]
        .spacing(10);

        column![
            self.view_header(),
            container(body)
                .padding(20)
                .width(Length::Fill)
                .height(Length::Fill),
        ]
        .into()
    }

    fn view_header(&self) -> Element<Message> {
        container(
            row![
                text("Defect Research Assistant")
                    .size(24)
                    .font(BOLD)
                    .color(Color::WHITE),
                horizontal_space(),
                text("AI Spotter").size(14).color(Color::WHITE),
            ]
            .align_y(alignment::Vertical::Center)
            .spacing(10),
        )
        .width(Length::Fill)
        .padding(Padding::from([15, 20]))
        .style(header)
        .into()
    }

    fn view_sidebar(&self) -> Element<Message> {
        let enabled = self.controller.controls_enabled();

        let mut buttons = column![].spacing(5);
        for topic in Topic::ALL {
            buttons = buttons.push(
                button(text(topic.label()).size(13).font(BOLD))
                    .on_press_maybe(enabled.then_some(Message::TopicPressed(topic)))
                    .width(Length::Fill)
                    .padding(10)
                    .style(topic_button),
            );
        }

        container(
            column![
                text("Common defects (NEU-SDD)")
                    .size(14)
                    .font(BOLD)
                    .style(text::success),
                buttons,
            ]
            .spacing(10),
        )
        .width(Length::Fixed(220.0))
        .height(Length::Fill)
        .padding(10)
        .style(sidebar)
        .into()
    }

    fn view_output(&self) -> Element<Message> {
        if self.controller.is_loading() {
            return self.view_loading();
        }

        let mut blocks = column![].spacing(12);
        for block in self.controller.blocks() {
            let element: Element<Message> = match block {
                Block::Notice(notice) => text(notice.clone()).size(15).into(),
                Block::Answer(answer) => render_markdown(answer),
                Block::Entry(entry) => render_entry(entry),
                Block::Failure(message) => text(format!("ERROR: {}", message))
                    .size(15)
                    .font(BOLD)
                    .style(text::danger)
                    .into(),
            };
            blocks = blocks.push(element);
        }

        scrollable(container(blocks).padding(15).width(Length::Fill))
            .height(Length::Fill)
            .into()
    }

    fn view_loading(&self) -> Element<Message> {
        let spinner = SPINNER_FRAMES[self.loading_frame % SPINNER_FRAMES.len()];

        container(
            column![
                text(spinner).size(32).style(text::success),
                text("Consulting Gemini... this can take a few seconds.")
                    .size(15)
                    .style(text::success),
            ]
            .spacing(10)
            .align_x(alignment::Horizontal::Center),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .align_x(alignment::Horizontal::Center)
        .align_y(alignment::Vertical::Center)
        .into()
    }

    fn theme(&self) -> Theme {
        Theme::custom(
            "Umsa".to_string(),
            Palette {
                background: Color::from_rgb8(0x18, 0x1a, 0x1d),
                text: Color::from_rgb8(0xf0, 0xf4, 0xf8),
                primary: Color::from_rgb8(0x00, 0x33, 0x66),
                success: Color::from_rgb8(0xd4, 0xaf, 0x37),
                danger: Color::from_rgb8(0xe5, 0x48, 0x4d),
            },
        )
    }
}

/// Map a response onto styled text runs: `**` delimited spans become bold.
fn render_markdown(source: &str) -> Element<'static, Message> {
    let spans: Vec<Span<'static, Message>> = markdown::segment(source)
        .into_iter()
        .map(|segment| {
            let run = span(segment.content).size(15);
            if segment.emphasized {
                run.font(BOLD)
            } else {
                run
            }
        })
        .collect();

    rich_text(spans).into()
}

fn render_entry(entry: &controller::ConversationEntry) -> Element<'static, Message> {
    let mut spans: Vec<Span<'static, Message>> = Vec::new();

    match entry.role {
        Role::User => {
            spans.push(
                span("[You]: ")
                    .size(15)
                    .font(BOLD)
                    .color(Color::from_rgb8(0x66, 0x99, 0xcc)),
            );
            spans.push(span(entry.text.clone()).size(15));
        }
        Role::Assistant => {
            spans.push(span("[Gemini]: ").size(15).font(BOLD));
            for segment in markdown::segment(&entry.text) {
                let run = span(segment.content).size(15);
                spans.push(if segment.emphasized { run.font(BOLD) } else { run });
            }
        }
    }

    rich_text(spans).into()
}

fn header(theme: &Theme) -> container::Style {
    container::Style {
        background: Some(theme.palette().primary.into()),
        ..container::Style::default()
    }
}

fn sidebar(_theme: &Theme) -> container::Style {
    container::Style {
        background: Some(Color::from_rgb8(0x33, 0x36, 0x3b).into()),
        border: border::rounded(8.0),
        ..container::Style::default()
    }
}

fn panel(_theme: &Theme) -> container::Style {
    container::Style {
        background: Some(Color::from_rgb8(0x2c, 0x2f, 0x33).into()),
        border: border::rounded(8.0),
        ..container::Style::default()
    }
}

fn topic_button(theme: &Theme, status: button::Status) -> button::Style {
    let gold = theme.palette().success;
    let base = button::Style {
        background: Some(gold.into()),
        text_color: Color::WHITE,
        border: border::rounded(6.0),
        ..button::Style::default()
    };

    match status {
        button::Status::Hovered => button::Style {
            background: Some(Color::from_rgb8(0xe0, 0xc2, 0x50).into()),
            ..base
        },
        button::Status::Disabled => button::Style {
            background: Some(Color { a: 0.4, ..gold }.into()),
            ..base
        },
        _ => base,
    }
}
